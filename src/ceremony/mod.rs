//! Multi-party trusted setup.
//!
//! Each ceremony is a small state machine
//! `initialized -> in_progress -> completed`, with `aborted` reachable from either
//! non-terminal state. Contributions to one ceremony take turns in arrival order on
//! that ceremony's contribution lock, which stays held while the quorum contribution
//! derives keys. The ceremony record itself sits behind a separate `RwLock` that is
//! only write-locked to commit, so status reads never wait on key generation.
//! Different ceremonies never contend.

pub mod chain;
pub mod error;
pub mod types;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use rand::{rngs::StdRng, SeedableRng};
use tokio::sync::Mutex as TurnLock;

use crate::backend::{verifying_key_fingerprint, Groth16Backend, ProofSystem};
use crate::clock::{Clock, IdGenerator};
use crate::keys::{DerivedKeys, KeyMaterial, KeyRegistry};
use crate::relations::RelationId;
use crate::tokio_tools::spawn_named_blocking;

pub use error::CeremonyError;
pub use types::{
    Ceremony, CeremonyId, CeremonyStatistics, CeremonyStatus, Contribution, ContributionData,
    ParticipantId, StateHash,
};

const LOG_TARGET: &str = "zk_card_engine::ceremony";

/// Result of one applied contribution.
#[derive(Debug, Clone)]
pub struct ContributionOutcome {
    pub contribution: Contribution,
    pub status: CeremonyStatus,
    /// Set on the contribution that completed the ceremony.
    pub key_material: Option<Arc<KeyMaterial>>,
}

struct CeremonySlot {
    /// FIFO-fair; held from validation through commit of one contribution.
    turn: TurnLock<()>,
    state: RwLock<Ceremony>,
}

impl CeremonySlot {
    fn new(ceremony: Ceremony) -> Self {
        Self {
            turn: TurnLock::new(()),
            state: RwLock::new(ceremony),
        }
    }
}

/// A contribution that passed validation, not yet committed.
struct PendingContribution {
    participant: ParticipantId,
    next_state: StateHash,
    contributors: usize,
    reaches_quorum: bool,
}

pub struct CeremonyManager {
    ceremonies: DashMap<CeremonyId, Arc<CeremonySlot>>,
    registry: Arc<KeyRegistry>,
    backend: Arc<Groth16Backend>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    min_contributions: usize,
}

impl CeremonyManager {
    pub fn new(
        registry: Arc<KeyRegistry>,
        backend: Arc<Groth16Backend>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        min_contributions: usize,
    ) -> Self {
        Self {
            ceremonies: DashMap::new(),
            registry,
            backend,
            ids,
            clock,
            min_contributions: min_contributions.max(1),
        }
    }

    pub fn min_contributions(&self) -> usize {
        self.min_contributions
    }

    pub fn initialize_ceremony(
        &self,
        relation: &str,
        title: impl Into<String>,
        description: impl Into<String>,
        initiator: impl Into<ParticipantId>,
    ) -> Result<Ceremony, CeremonyError> {
        let relation: RelationId = relation
            .parse()
            .map_err(|_| CeremonyError::UnknownRelation(relation.to_string()))?;
        let title = title.into();
        let initiator = initiator.into();
        let id = self.ids.next_id("ceremony");
        let now = self.clock.now();

        let ceremony = Ceremony {
            current_state: chain::genesis_state(&id, relation, &title),
            id: id.clone(),
            relation,
            title,
            description: description.into(),
            initiator: initiator.clone(),
            participants: vec![initiator],
            contributions: Vec::new(),
            status: CeremonyStatus::Initialized,
            created_at: now,
            updated_at: now,
            completed_at: None,
            key_version: None,
            abort_reason: None,
        };

        tracing::info!(
            target: LOG_TARGET,
            ceremony_id = %id,
            %relation,
            initiator = %ceremony.initiator,
            "ceremony initialized"
        );
        self.ceremonies
            .insert(id, Arc::new(CeremonySlot::new(ceremony.clone())));
        Ok(ceremony)
    }

    pub fn add_participant(
        &self,
        ceremony_id: &str,
        participant: impl Into<ParticipantId>,
    ) -> Result<Ceremony, CeremonyError> {
        let participant = participant.into();
        let slot = self.slot(ceremony_id)?;
        let mut ceremony = slot.state.write();

        ensure_open(&ceremony, "join")?;
        if ceremony.participants.contains(&participant) {
            return Err(CeremonyError::DuplicateParticipant {
                ceremony_id: ceremony.id.clone(),
                participant,
            });
        }

        ceremony.participants.push(participant);
        ceremony.updated_at = self.clock.now();
        tracing::debug!(
            target: LOG_TARGET,
            ceremony_id = %ceremony.id,
            participants = ceremony.participants.len(),
            "participant joined"
        );
        Ok(ceremony.clone())
    }

    /// Folds `data` into the ceremony chain. Concurrent callers are served in the
    /// order they reached the ceremony's contribution lock. The contribution that
    /// reaches quorum derives the Groth16 keys on the blocking pool before anything
    /// is committed; an abort that lands meanwhile wins and the keys are discarded.
    pub async fn make_contribution(
        &self,
        ceremony_id: &str,
        participant: impl Into<ParticipantId>,
        data: ContributionData,
    ) -> Result<ContributionOutcome, CeremonyError> {
        let participant = participant.into();
        let slot = self.slot(ceremony_id)?;
        let _turn = slot.turn.lock().await;

        let (pending, relation) = {
            let ceremony = slot.state.read();
            let pending =
                prepare_contribution(&ceremony, participant, &data, self.min_contributions)?;
            (pending, ceremony.relation)
        };
        drop(data);

        let derived = if pending.reaches_quorum {
            let backend = Arc::clone(&self.backend);
            let id = ceremony_id.to_string();
            let final_state = pending.next_state;
            let keys = spawn_named_blocking(format!("ceremony_keys:{ceremony_id}"), move || {
                derive_keys(&backend, relation, id, final_state)
            })
            .await
            .map_err(|err| CeremonyError::Task(err.to_string()))??;
            Some(keys)
        } else {
            None
        };

        let mut ceremony = slot.state.write();
        commit_contribution(
            &mut ceremony,
            pending,
            derived,
            self.min_contributions,
            &self.registry,
            self.clock.as_ref(),
        )
    }

    pub fn abort_ceremony(
        &self,
        ceremony_id: &str,
        reason: impl Into<String>,
    ) -> Result<Ceremony, CeremonyError> {
        let slot = self.slot(ceremony_id)?;
        let mut ceremony = slot.state.write();
        ensure_open(&ceremony, "abort")?;

        let reason = reason.into();
        ceremony.status = CeremonyStatus::Aborted;
        ceremony.updated_at = self.clock.now();
        tracing::warn!(
            target: LOG_TARGET,
            ceremony_id = %ceremony.id,
            relation = %ceremony.relation,
            reason = %reason,
            "ceremony aborted"
        );
        ceremony.abort_reason = Some(reason);
        Ok(ceremony.clone())
    }

    pub fn get_ceremony_status(&self, ceremony_id: &str) -> Result<Ceremony, CeremonyError> {
        Ok(self.slot(ceremony_id)?.state.read().clone())
    }

    /// Non-terminal ceremonies, oldest first.
    pub fn list_active_ceremonies(&self) -> Vec<Ceremony> {
        let mut active: Vec<Ceremony> = self
            .snapshots()
            .into_iter()
            .filter(|ceremony| !ceremony.status.is_terminal())
            .collect();
        active.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        active
    }

    pub fn get_statistics(&self) -> CeremonyStatistics {
        let mut stats = CeremonyStatistics {
            published_key_sets: self.registry.published_count(),
            ..Default::default()
        };
        for ceremony in self.snapshots() {
            stats.total_ceremonies += 1;
            stats.total_contributions += ceremony.contributions.len();
            match ceremony.status {
                CeremonyStatus::Initialized => stats.initialized += 1,
                CeremonyStatus::InProgress => stats.in_progress += 1,
                CeremonyStatus::Completed => stats.completed += 1,
                CeremonyStatus::Aborted => stats.aborted += 1,
            }
        }
        stats
    }

    fn slot(&self, ceremony_id: &str) -> Result<Arc<CeremonySlot>, CeremonyError> {
        self.ceremonies
            .get(ceremony_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| CeremonyError::UnknownCeremony(ceremony_id.to_string()))
    }

    fn snapshots(&self) -> Vec<Ceremony> {
        // Clone the slots first so no shard lock is held while reading a ceremony.
        let slots: Vec<Arc<CeremonySlot>> = self
            .ceremonies
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        slots.iter().map(|slot| slot.state.read().clone()).collect()
    }
}

fn ensure_open(ceremony: &Ceremony, operation: &'static str) -> Result<(), CeremonyError> {
    if ceremony.status.is_terminal() {
        return Err(CeremonyError::InvalidState {
            ceremony_id: ceremony.id.clone(),
            status: ceremony.status,
            operation,
        });
    }
    Ok(())
}

fn prepare_contribution(
    ceremony: &Ceremony,
    participant: ParticipantId,
    data: &ContributionData,
    quorum: usize,
) -> Result<PendingContribution, CeremonyError> {
    ensure_open(ceremony, "contribute to")?;
    if !ceremony.participants.contains(&participant) {
        return Err(CeremonyError::UnknownParticipant {
            ceremony_id: ceremony.id.clone(),
            participant,
        });
    }
    if let Some(component) = data.missing_component() {
        return Err(CeremonyError::InvalidContribution(format!(
            "component `{component}` is empty"
        )));
    }

    let next_state = chain::fold_contribution(&ceremony.current_state, &participant, data);
    let contributors = ceremony.distinct_contributors()
        + usize::from(!ceremony.has_contributed(&participant));
    Ok(PendingContribution {
        participant,
        next_state,
        contributors,
        reaches_quorum: contributors >= quorum,
    })
}

/// Applies a validated contribution. The ceremony may have been aborted while keys
/// were being derived, so openness is checked again here.
fn commit_contribution(
    ceremony: &mut Ceremony,
    pending: PendingContribution,
    derived: Option<DerivedKeys>,
    quorum: usize,
    registry: &KeyRegistry,
    clock: &dyn Clock,
) -> Result<ContributionOutcome, CeremonyError> {
    ensure_open(ceremony, "contribute to")?;

    let now = clock.now();
    let contribution = Contribution {
        ceremony_id: ceremony.id.clone(),
        participant_id: pending.participant,
        sequence: ceremony.contributions.len() as u32 + 1,
        applied_at: now,
        resulting_state: pending.next_state,
    };
    ceremony.contributions.push(contribution.clone());
    ceremony.current_state = pending.next_state;
    ceremony.status = CeremonyStatus::InProgress;
    ceremony.updated_at = now;

    tracing::info!(
        target: LOG_TARGET,
        ceremony_id = %ceremony.id,
        participant = %contribution.participant_id,
        sequence = contribution.sequence,
        contributors = pending.contributors,
        quorum,
        state = %pending.next_state,
        "contribution applied"
    );

    let key_material = derived.map(|keys| {
        let material = registry.publish(keys, now);
        ceremony.status = CeremonyStatus::Completed;
        ceremony.completed_at = Some(now);
        ceremony.key_version = Some(material.version);
        tracing::info!(
            target: LOG_TARGET,
            ceremony_id = %ceremony.id,
            relation = %ceremony.relation,
            version = material.version,
            "ceremony completed"
        );
        material
    });

    Ok(ContributionOutcome {
        contribution,
        status: ceremony.status,
        key_material,
    })
}

fn derive_keys(
    backend: &Groth16Backend,
    relation: RelationId,
    ceremony_id: CeremonyId,
    final_state: StateHash,
) -> Result<DerivedKeys, CeremonyError> {
    let mut rng = StdRng::from_seed(chain::key_seed(&final_state));
    let (proving_key, verifying_key) = backend.generate_keys(relation, &mut rng)?;
    let prepared_verifying_key = backend.prepare(&verifying_key)?;
    let fingerprint = verifying_key_fingerprint(&verifying_key)?;
    Ok(DerivedKeys {
        relation,
        ceremony_id,
        final_state,
        fingerprint,
        proving_key,
        verifying_key,
        prepared_verifying_key,
    })
}
