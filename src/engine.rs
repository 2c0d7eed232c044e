//! Single entry point wiring the key registry, ceremony manager and proof manager.

use std::sync::Arc;

use futures::future::try_join_all;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use rand::{rngs::StdRng, SeedableRng};
use thiserror::Error;

use crate::backend::{Groth16Backend, ScalarField};
use crate::ceremony::{CeremonyError, CeremonyId, CeremonyManager, ContributionData};
use crate::clock::{Clock, IdGenerator, SystemClock, UuidGenerator};
use crate::config::{poseidon_config, ConfigError, EngineConfig};
use crate::keys::{KeyMaterial, KeyRegistry};
use crate::proof_manager::{Proof, ProofError, ProofManager, ProofResult};
use crate::relations::{RelationId, RelationSchema, RelationWitness};

const LOG_TARGET: &str = "zk_card_engine::engine";

/// Keeps the setup participants' randomness stream apart from the proof manager's.
const SETUP_RNG_TWEAK: u64 = 0x5e7u64 << 48;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Ceremony(#[from] CeremonyError),
    #[error("ceremony `{0}` ended without publishing key material")]
    Incomplete(CeremonyId),
}

pub struct Engine {
    config: EngineConfig,
    registry: Arc<KeyRegistry>,
    ceremonies: Arc<CeremonyManager>,
    proofs: ProofManager,
    setup_rng: Mutex<StdRng>,
    schemas: OnceCell<Vec<RelationSchema>>,
}

impl Engine {
    /// Engine with UUID ids and the system clock.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        Self::with_sources(config, Arc::new(UuidGenerator), Arc::new(SystemClock))
    }

    pub fn with_sources(
        config: EngineConfig,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let backend = Arc::new(Groth16Backend::new(poseidon_config::<ScalarField>()));
        let registry = Arc::new(KeyRegistry::new());
        let ceremonies = Arc::new(CeremonyManager::new(
            Arc::clone(&registry),
            Arc::clone(&backend),
            Arc::clone(&ids),
            Arc::clone(&clock),
            config.min_contributions,
        ));
        let proofs = ProofManager::new(&config, Arc::clone(&registry), backend, ids, clock);
        let setup_rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ SETUP_RNG_TWEAK),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            config,
            registry,
            ceremonies,
            proofs,
            setup_rng: Mutex::new(setup_rng),
            schemas: OnceCell::new(),
        })
    }

    /// Loads the relation catalogue. Safe to call any number of times.
    pub fn initialize(&self) -> &[RelationSchema] {
        self.schemas.get_or_init(|| {
            let schemas: Vec<RelationSchema> =
                RelationId::ALL.iter().map(RelationId::schema).collect();
            for schema in &schemas {
                tracing::info!(
                    target: LOG_TARGET,
                    relation = %schema.relation,
                    public_inputs = ?schema.public_inputs,
                    "relation loaded"
                );
            }
            schemas
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &KeyRegistry {
        &self.registry
    }

    pub fn ceremonies(&self) -> &CeremonyManager {
        &self.ceremonies
    }

    pub fn proofs(&self) -> &ProofManager {
        &self.proofs
    }

    /// Drives a fresh ceremony to completion with engine-owned participants, one
    /// contribution each, and returns the published keys.
    pub async fn trusted_setup(&self, relation: RelationId) -> Result<Arc<KeyMaterial>, EngineError> {
        self.initialize();
        let quorum = self.ceremonies.min_contributions();
        let participants: Vec<String> = (1..=quorum).map(|i| format!("engine-setup-{i}")).collect();

        let ceremony = self.ceremonies.initialize_ceremony(
            relation.as_str(),
            format!("{relation} trusted setup"),
            "engine-driven setup",
            participants[0].clone(),
        )?;
        for participant in &participants[1..] {
            self.ceremonies.add_participant(&ceremony.id, participant.clone())?;
        }

        tracing::info!(
            target: LOG_TARGET,
            ceremony_id = %ceremony.id,
            %relation,
            quorum,
            "running trusted setup"
        );
        let mut published = None;
        for participant in participants {
            let data = ContributionData::random(&mut *self.setup_rng.lock());
            let outcome = self
                .ceremonies
                .make_contribution(&ceremony.id, participant, data)
                .await?;
            published = outcome.key_material;
        }
        published.ok_or(EngineError::Incomplete(ceremony.id))
    }

    /// Runs every relation's setup concurrently.
    pub async fn trusted_setup_all(&self) -> Result<Vec<Arc<KeyMaterial>>, EngineError> {
        try_join_all(RelationId::ALL.iter().map(|relation| self.trusted_setup(*relation))).await
    }

    pub async fn generate_proof(&self, witness: RelationWitness<ScalarField>) -> ProofResult {
        self.proofs.generate_proof(witness, None, None).await
    }

    pub async fn verify_proof(&self, proof: &Proof) -> Result<bool, ProofError> {
        self.proofs.verify_proof(proof).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ceremony::CeremonyStatus;
    use crate::clock::{ManualClock, SequentialIdGenerator};
    use crate::relations::{CardCommitmentWitness, DECK_SIZE};
    use crate::test_utils::setup_test_tracing;
    use chrono::{TimeZone, Utc};

    fn engine() -> Engine {
        let config = EngineConfig {
            rng_seed: Some(42),
            ..EngineConfig::default()
        };
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Engine::with_sources(
            config,
            Arc::new(SequentialIdGenerator::new()),
            Arc::new(ManualClock::new(start)),
        )
        .unwrap()
    }

    #[test]
    fn initialize_is_idempotent() {
        let engine = engine();
        let first = engine.initialize().to_vec();
        let second = engine.initialize();
        assert_eq!(first, second);
        assert_eq!(first.len(), RelationId::ALL.len());
    }

    #[test]
    fn rejects_invalid_config() {
        let config = EngineConfig {
            min_contributions: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(Engine::new(config), Err(EngineError::Config(_))));
    }

    #[tokio::test]
    async fn trusted_setup_then_ad_hoc_proof() {
        let _guard = setup_test_tracing("zk_card_engine");
        let engine = engine();
        let material = engine.trusted_setup(RelationId::CardCommitment).await.unwrap();
        assert_eq!(material.version, 1);

        let ceremony = engine
            .ceremonies()
            .get_ceremony_status(&material.ceremony_id)
            .unwrap();
        assert_eq!(ceremony.status, CeremonyStatus::Completed);
        assert_eq!(ceremony.contributions.len(), engine.config().min_contributions);

        let witness = CardCommitmentWitness::new(10, ScalarField::from(777u64), engine.proofs().hasher());
        let result = engine
            .generate_proof(RelationWitness::CardCommitment(witness))
            .await;
        assert!(result.success, "{:?}", result.error);
        assert!(engine.verify_proof(&result.proof.unwrap()).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn end_to_end_hand() {
        let _guard = setup_test_tracing("zk_card_engine");
        let engine = engine();
        let published = engine.trusted_setup_all().await.unwrap();
        assert_eq!(published.len(), RelationId::ALL.len());
        assert_eq!(engine.ceremonies().get_statistics().completed, RelationId::ALL.len());

        let original: Vec<u64> = (0..DECK_SIZE as u64).collect();
        let shuffled: Vec<u64> = original.iter().rev().copied().collect();
        let permutation: Vec<u64> = shuffled
            .iter()
            .map(|card| original.iter().position(|c| c == card).unwrap() as u64)
            .collect();

        let proofs = engine.proofs();
        let results = vec![
            proofs.create_deck_generation_proof("game-42").await,
            proofs
                .create_card_shuffle_proof(&original, &shuffled, &permutation, "g1")
                .await,
            proofs
                .create_card_dealing_proof(&shuffled, &[0, 1, 2, 3], "g1", None)
                .await,
            proofs
                .create_card_commitment_proof(10, ScalarField::from(777u64), "g1", None)
                .await,
        ];
        for result in &results {
            assert!(result.success, "{:?}", result.error);
        }

        let all: Vec<Proof> = results.into_iter().filter_map(|r| r.proof).collect();
        let batch = proofs.verify_batch_proofs(&all).await;
        assert!(batch.valid);
        assert!(batch.failures.is_empty());
        assert_eq!(proofs.get_proof_history().len(), 4);
    }
}
