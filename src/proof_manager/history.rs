//! Bounded proof history.
//!
//! Readers take an `Arc` of the current snapshot and never block writers for longer
//! than the pointer swap. Appends copy-on-write under the write lock, and a clear
//! replaces the snapshot wholesale, so an append that lands after `clear` returns is
//! always kept.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use super::types::ProofResult;
use crate::relations::RelationId;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub relation: RelationId,
    pub recorded_at: DateTime<Utc>,
    pub result: ProofResult,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofStatistics {
    pub total_generated: u64,
    pub successful: u64,
    pub failed: u64,
    pub verifications: u64,
    pub verified: u64,
    pub average_proving_time_ms: f64,
    pub per_relation: BTreeMap<RelationId, u64>,
}

#[derive(Clone, Debug, Default)]
pub struct HistorySnapshot {
    pub entries: VecDeque<HistoryEntry>,
    pub statistics: ProofStatistics,
    total_success_ms: u64,
}

pub struct ProofHistory {
    capacity: usize,
    current: RwLock<Arc<HistorySnapshot>>,
}

impl ProofHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            current: RwLock::new(Arc::new(HistorySnapshot::default())),
        }
    }

    pub fn snapshot(&self) -> Arc<HistorySnapshot> {
        Arc::clone(&self.current.read())
    }

    pub fn record(&self, relation: RelationId, result: ProofResult, recorded_at: DateTime<Utc>) {
        let mut current = self.current.write();
        let snapshot = Arc::make_mut(&mut *current);

        let stats = &mut snapshot.statistics;
        stats.total_generated += 1;
        *stats.per_relation.entry(relation).or_default() += 1;
        if result.success {
            stats.successful += 1;
            snapshot.total_success_ms += result.processing_time_ms;
            stats.average_proving_time_ms =
                snapshot.total_success_ms as f64 / stats.successful as f64;
        } else {
            stats.failed += 1;
        }

        if snapshot.entries.len() == self.capacity {
            snapshot.entries.pop_front();
        }
        snapshot.entries.push_back(HistoryEntry {
            relation,
            recorded_at,
            result,
        });
    }

    pub fn record_verification(&self, valid: bool) {
        let mut current = self.current.write();
        let stats = &mut Arc::make_mut(&mut *current).statistics;
        stats.verifications += 1;
        if valid {
            stats.verified += 1;
        }
    }

    pub fn clear(&self) {
        *self.current.write() = Arc::new(HistorySnapshot::default());
    }
}
