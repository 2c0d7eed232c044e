//! Published Groth16 key material, one ordered version list per relation.

use std::collections::HashMap;
use std::sync::Arc;

use ark_groth16::{PreparedVerifyingKey, ProvingKey, VerifyingKey};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::backend::Curve;
use crate::ceremony::{CeremonyId, StateHash};
use crate::relations::RelationId;

const LOG_TARGET: &str = "zk_card_engine::keys";

/// Keys derived from a completed ceremony, before a version is assigned.
pub struct DerivedKeys {
    pub relation: RelationId,
    pub ceremony_id: CeremonyId,
    pub final_state: StateHash,
    pub fingerprint: String,
    pub proving_key: ProvingKey<Curve>,
    pub verifying_key: VerifyingKey<Curve>,
    pub prepared_verifying_key: PreparedVerifyingKey<Curve>,
}

/// Immutable once published.
pub struct KeyMaterial {
    pub relation: RelationId,
    pub version: u32,
    pub ceremony_id: CeremonyId,
    pub final_state: StateHash,
    pub fingerprint: String,
    pub published_at: DateTime<Utc>,
    pub proving_key: ProvingKey<Curve>,
    pub verifying_key: VerifyingKey<Curve>,
    pub prepared_verifying_key: PreparedVerifyingKey<Curve>,
}

impl KeyMaterial {
    pub fn summary(&self) -> KeyMaterialSummary {
        KeyMaterialSummary {
            relation: self.relation,
            version: self.version,
            ceremony_id: self.ceremony_id.clone(),
            final_state: self.final_state,
            fingerprint: self.fingerprint.clone(),
            published_at: self.published_at,
            public_inputs: self.verifying_key.gamma_abc_g1.len() - 1,
        }
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("relation", &self.relation)
            .field("version", &self.version)
            .field("ceremony_id", &self.ceremony_id)
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMaterialSummary {
    pub relation: RelationId,
    pub version: u32,
    pub ceremony_id: CeremonyId,
    pub final_state: StateHash,
    pub fingerprint: String,
    pub published_at: DateTime<Utc>,
    pub public_inputs: usize,
}

#[derive(Default)]
pub struct KeyRegistry {
    versions: RwLock<HashMap<RelationId, Vec<Arc<KeyMaterial>>>>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `keys` as the next version for its relation. Versions start at 1.
    pub fn publish(&self, keys: DerivedKeys, published_at: DateTime<Utc>) -> Arc<KeyMaterial> {
        let mut versions = self.versions.write();
        let list = versions.entry(keys.relation).or_default();
        let material = Arc::new(KeyMaterial {
            relation: keys.relation,
            version: list.len() as u32 + 1,
            ceremony_id: keys.ceremony_id,
            final_state: keys.final_state,
            fingerprint: keys.fingerprint,
            published_at,
            proving_key: keys.proving_key,
            verifying_key: keys.verifying_key,
            prepared_verifying_key: keys.prepared_verifying_key,
        });
        list.push(Arc::clone(&material));

        tracing::info!(
            target: LOG_TARGET,
            relation = %material.relation,
            version = material.version,
            ceremony_id = %material.ceremony_id,
            fingerprint = %material.fingerprint,
            "published key material"
        );
        material
    }

    pub fn latest(&self, relation: RelationId) -> Option<Arc<KeyMaterial>> {
        self.versions
            .read()
            .get(&relation)
            .and_then(|list| list.last().cloned())
    }

    pub fn get(&self, relation: RelationId, version: u32) -> Option<Arc<KeyMaterial>> {
        let index = usize::try_from(version).ok()?.checked_sub(1)?;
        self.versions
            .read()
            .get(&relation)
            .and_then(|list| list.get(index).cloned())
    }

    /// Total number of published key sets across relations.
    pub fn published_count(&self) -> usize {
        self.versions.read().values().map(Vec::len).sum()
    }

    pub fn summary(&self) -> Vec<KeyMaterialSummary> {
        let versions = self.versions.read();
        let mut summaries: Vec<KeyMaterialSummary> = versions
            .values()
            .flat_map(|list| list.iter().map(|material| material.summary()))
            .collect();
        summaries.sort_by_key(|summary| (summary.relation, summary.version));
        summaries
    }
}
