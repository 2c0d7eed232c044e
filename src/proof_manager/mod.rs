//! Witness construction, proving, verification and proof bookkeeping.
//!
//! Creation operations never return `Err`: expected failures (bad input, missing
//! keys, timeouts) come back as a failed [`ProofResult`] and are recorded in history
//! like successes are.

pub mod error;
pub mod history;
pub mod types;
pub mod witness;


use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::sync::Semaphore;

use crate::backend::{
    decode_proof, encode_proof, BackendError, Groth16Backend, ProofSystem, ScalarField,
};
use crate::clock::{Clock, IdGenerator};
use crate::config::EngineConfig;
use crate::hashing::CardHasher;
use crate::keys::KeyRegistry;
use crate::relations::{CardCommitmentWitness, DeckGenerationWitness, RelationId, RelationWitness};
use crate::tokio_tools::{spawn_named_blocking, spawn_named_task};

pub use error::{ProofError, ProofErrorKind, ProofFailure};
pub use history::{HistoryEntry, ProofHistory, ProofStatistics};
pub use types::{
    BatchProofRequest, BatchProofResult, BatchVerificationResult, Proof, ProofId, ProofInstance,
    ProofMetadata, ProofRequest, ProofResult, VerificationOutcome,
};

const LOG_TARGET: &str = "zk_card_engine::proof_manager";

/// Cheap to clone; clones share keys, randomness, workers and history.
#[derive(Clone)]
pub struct ProofManager {
    registry: Arc<KeyRegistry>,
    backend: Arc<Groth16Backend>,
    hasher: Arc<CardHasher<ScalarField>>,
    rng: Arc<Mutex<StdRng>>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    workers: Arc<Semaphore>,
    timeout: Duration,
    history: Arc<ProofHistory>,
}

struct ProofContext {
    game_id: Option<String>,
    player_id: Option<String>,
}

impl ProofManager {
    pub fn new(
        config: &EngineConfig,
        registry: Arc<KeyRegistry>,
        backend: Arc<Groth16Backend>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            hasher: Arc::new(CardHasher::from_config(backend.poseidon().clone())),
            registry,
            backend,
            rng: Arc::new(Mutex::new(rng)),
            ids,
            clock,
            workers: Arc::new(Semaphore::new(config.max_parallel_proofs.max(1))),
            timeout: config.proof_timeout(),
            history: Arc::new(ProofHistory::new(config.history_capacity)),
        }
    }

    pub fn hasher(&self) -> &CardHasher<ScalarField> {
        &self.hasher
    }

    /// Proves the deck that `seed` deterministically derives is a permutation of `0..52`.
    pub async fn create_deck_generation_proof(&self, seed: &str) -> ProofResult {
        let started = Instant::now();
        let witness = DeckGenerationWitness::from_seed(seed, &self.hasher);
        self.prove_and_record(
            RelationId::DeckGeneration,
            Ok(vec![RelationWitness::DeckGeneration(witness)]),
            ProofContext {
                game_id: None,
                player_id: None,
            },
            started,
        )
        .await
    }

    pub async fn create_card_commitment_proof(
        &self,
        card_value: u64,
        nonce: ScalarField,
        game_id: &str,
        player_id: Option<&str>,
    ) -> ProofResult {
        let started = Instant::now();
        let witness = CardCommitmentWitness::new(card_value, nonce, &self.hasher);
        self.prove_and_record(
            RelationId::CardCommitment,
            Ok(vec![RelationWitness::CardCommitment(witness)]),
            context(Some(game_id), player_id),
            started,
        )
        .await
    }

    pub async fn create_card_shuffle_proof(
        &self,
        original_deck: &[u64],
        shuffled_deck: &[u64],
        permutation: &[u64],
        game_id: &str,
    ) -> ProofResult {
        let started = Instant::now();
        let witnesses =
            witness::shuffle_sample(original_deck, shuffled_deck, permutation, &self.hasher)
                .map(|w| vec![RelationWitness::ShuffleVerify(w)]);
        self.prove_and_record(
            RelationId::ShuffleVerify,
            witnesses,
            context(Some(game_id), None),
            started,
        )
        .await
    }

    /// One DealVerify instance per position, bundled into a single proof.
    pub async fn create_card_dealing_proof(
        &self,
        deck: &[u64],
        positions: &[u64],
        game_id: &str,
        player_id: Option<&str>,
    ) -> ProofResult {
        let started = Instant::now();
        let witnesses = {
            let mut rng = self.rng.lock();
            witness::dealing_witnesses(deck, positions, game_id, &self.hasher, &mut *rng)
        }
        .map(|ws| ws.into_iter().map(RelationWitness::DealVerify).collect());
        self.prove_and_record(
            RelationId::DealVerify,
            witnesses,
            context(Some(game_id), player_id),
            started,
        )
        .await
    }

    /// Proves an arbitrary witness. Only the relation's own constraints are checked.
    pub async fn generate_proof(
        &self,
        witness: RelationWitness<ScalarField>,
        game_id: Option<&str>,
        player_id: Option<&str>,
    ) -> ProofResult {
        let started = Instant::now();
        self.prove_and_record(
            witness.relation(),
            Ok(vec![witness]),
            context(game_id, player_id),
            started,
        )
        .await
    }

    /// `Ok(false)` for a well-formed proof that does not verify; `Err` for a proof
    /// that cannot be checked at all.
    pub async fn verify_proof(&self, proof: &Proof) -> Result<bool, ProofError> {
        let outcome = self.verify_inner(proof).await;
        if let Ok(valid) = outcome {
            self.history.record_verification(valid);
        }
        tracing::debug!(
            target: LOG_TARGET,
            proof_id = %proof.id,
            relation = %proof.relation,
            ?outcome,
            "verified proof"
        );
        outcome
    }

    /// Verifies every proof independently; one fault never hides another result.
    pub async fn verify_batch_proofs(&self, proofs: &[Proof]) -> BatchVerificationResult {
        let outcomes = join_all(proofs.iter().map(|proof| self.verify_proof(proof))).await;

        let results: Vec<VerificationOutcome> = proofs
            .iter()
            .zip(outcomes)
            .map(|(proof, outcome)| match outcome {
                Ok(valid) => VerificationOutcome {
                    proof_id: proof.id.clone(),
                    valid,
                    error: None,
                },
                Err(err) => VerificationOutcome {
                    proof_id: proof.id.clone(),
                    valid: false,
                    error: Some(err.to_failure()),
                },
            })
            .collect();
        let failures: Vec<ProofId> = results
            .iter()
            .filter(|result| !result.valid)
            .map(|result| result.proof_id.clone())
            .collect();

        tracing::info!(
            target: LOG_TARGET,
            total = results.len(),
            failed = failures.len(),
            "batch verification finished"
        );
        BatchVerificationResult {
            valid: failures.is_empty(),
            failures,
            results,
        }
    }

    /// Results always follow request order; `parallel` only changes scheduling.
    pub async fn generate_batch_proofs(&self, request: BatchProofRequest) -> BatchProofResult {
        let started = Instant::now();
        let verify = request.verify_immediately;

        let results = if request.parallel {
            let handles: Vec<_> = request
                .proofs
                .into_iter()
                .enumerate()
                .map(|(index, item)| {
                    let manager = self.clone();
                    spawn_named_task(format!("batch-proof-{index}"), async move {
                        manager.run_batch_item(item, verify).await
                    })
                })
                .collect();
            let mut results = Vec::with_capacity(handles.len());
            for handle in handles {
                results.push(handle.await.unwrap_or_else(|err| {
                    ProofResult::failed(&ProofError::Proving(err.to_string()), 0)
                }));
            }
            results
        } else {
            let mut results = Vec::with_capacity(request.proofs.len());
            for item in request.proofs {
                results.push(self.run_batch_item(item, verify).await);
            }
            results
        };

        let successful = results.iter().filter(|result| result.success).count();
        BatchProofResult {
            failed: results.len() - successful,
            successful,
            results,
            total_time_ms: elapsed_ms(started),
        }
    }

    pub fn get_statistics(&self) -> ProofStatistics {
        self.history.snapshot().statistics.clone()
    }

    pub fn get_proof_history(&self) -> Vec<HistoryEntry> {
        self.history.snapshot().entries.iter().cloned().collect()
    }

    pub fn clear_history(&self) {
        self.history.clear();
        tracing::info!(target: LOG_TARGET, "proof history cleared");
    }

    async fn run_request(&self, request: ProofRequest) -> ProofResult {
        match request {
            ProofRequest::DeckGeneration { seed } => self.create_deck_generation_proof(&seed).await,
            ProofRequest::CardCommitment {
                card_value,
                nonce,
                game_id,
                player_id,
            } => {
                self.create_card_commitment_proof(card_value, nonce, &game_id, player_id.as_deref())
                    .await
            }
            ProofRequest::CardShuffle {
                original_deck,
                shuffled_deck,
                permutation,
                game_id,
            } => {
                self.create_card_shuffle_proof(&original_deck, &shuffled_deck, &permutation, &game_id)
                    .await
            }
            ProofRequest::CardDealing {
                deck,
                positions,
                game_id,
                player_id,
            } => {
                self.create_card_dealing_proof(&deck, &positions, &game_id, player_id.as_deref())
                    .await
            }
        }
    }

    async fn run_batch_item(&self, request: ProofRequest, verify: bool) -> ProofResult {
        let mut result = self.run_request(request).await;
        if verify {
            result.verified = Some(match &result.proof {
                Some(proof) => self.verify_proof(proof).await.unwrap_or(false),
                None => false,
            });
        }
        result
    }

    async fn prove_and_record(
        &self,
        relation: RelationId,
        witnesses: Result<Vec<RelationWitness<ScalarField>>, ProofError>,
        context: ProofContext,
        started: Instant,
    ) -> ProofResult {
        let outcome = match witnesses {
            Ok(witnesses) => self.prove(relation, witnesses, context).await,
            Err(err) => Err(err),
        };
        let elapsed = elapsed_ms(started);

        let result = match outcome {
            Ok(proof) => {
                tracing::info!(
                    target: LOG_TARGET,
                    proof_id = %proof.id,
                    %relation,
                    instances = proof.instances.len(),
                    elapsed_ms = elapsed,
                    "proof generated"
                );
                ProofResult::succeeded(proof, elapsed)
            }
            Err(err) => {
                tracing::warn!(
                    target: LOG_TARGET,
                    %relation,
                    kind = ?err.kind(),
                    error = %err,
                    "proof generation failed"
                );
                ProofResult::failed(&err, elapsed)
            }
        };
        self.history
            .record(relation, result.clone(), self.clock.now());
        result
    }

    async fn prove(
        &self,
        relation: RelationId,
        witnesses: Vec<RelationWitness<ScalarField>>,
        context: ProofContext,
    ) -> Result<Proof, ProofError> {
        for witness in &witnesses {
            witness.check(&self.hasher)?;
        }
        let material = self
            .registry
            .latest(relation)
            .ok_or(ProofError::SetupNotReady(relation))?;

        let permit = Arc::clone(&self.workers)
            .acquire_owned()
            .await
            .map_err(|err| ProofError::Proving(err.to_string()))?;
        let mut rng = StdRng::from_seed(self.rng.lock().gen());
        let backend = Arc::clone(&self.backend);
        let keys = Arc::clone(&material);

        // The permit moves into the job so it is held until proving really stops,
        // even if the caller has already given up on a timeout.
        let job = spawn_named_blocking(format!("prove:{relation}"), move || {
            let _permit = permit;
            witnesses
                .into_iter()
                .map(|witness| {
                    let statement = witness.statement();
                    let proof = backend.prove(&keys.proving_key, witness, &mut rng)?;
                    Ok(ProofInstance {
                        statement,
                        proof_bytes: encode_proof(&proof)?,
                    })
                })
                .collect::<Result<Vec<_>, BackendError>>()
        });

        let instances = tokio::time::timeout(self.timeout, job)
            .await
            .map_err(|_| ProofError::Timeout(self.timeout))?
            .map_err(|err| ProofError::Proving(err.to_string()))?
            .map_err(|err| ProofError::Proving(err.to_string()))?;

        Ok(Proof {
            id: self.ids.next_id("proof"),
            relation,
            key_version: material.version,
            instances,
            metadata: ProofMetadata {
                game_id: context.game_id,
                player_id: context.player_id,
                created_at: self.clock.now(),
            },
        })
    }

    async fn verify_inner(&self, proof: &Proof) -> Result<bool, ProofError> {
        if proof.instances.is_empty() {
            return Err(ProofError::VerificationFault("proof has no instances".into()));
        }
        if let Some(instance) = proof
            .instances
            .iter()
            .find(|instance| instance.statement.relation() != proof.relation)
        {
            return Err(ProofError::VerificationFault(format!(
                "instance statement is for `{}`, proof claims `{}`",
                instance.statement.relation(),
                proof.relation
            )));
        }
        let material = match self.registry.get(proof.relation, proof.key_version) {
            Some(material) => material,
            None if self.registry.latest(proof.relation).is_none() => {
                return Err(ProofError::SetupNotReady(proof.relation))
            }
            None => {
                return Err(ProofError::VerificationFault(format!(
                    "no key material version {} for `{}`",
                    proof.key_version, proof.relation
                )))
            }
        };

        let backend = Arc::clone(&self.backend);
        let checks: Vec<(Vec<ScalarField>, Vec<u8>)> = proof
            .instances
            .iter()
            .map(|instance| (instance.statement.public_inputs(), instance.proof_bytes.clone()))
            .collect();

        spawn_named_blocking(format!("verify:{}", proof.id), move || -> Result<bool, ProofError> {
            for (inputs, bytes) in checks {
                let decoded = decode_proof(&bytes).map_err(fault)?;
                if !backend
                    .verify(&material.prepared_verifying_key, &inputs, &decoded)
                    .map_err(fault)?
                {
                    return Ok(false);
                }
            }
            Ok(true)
        })
        .await
        .map_err(|err| ProofError::VerificationFault(err.to_string()))?
    }
}

fn fault(err: BackendError) -> ProofError {
    ProofError::VerificationFault(err.to_string())
}

fn context(game_id: Option<&str>, player_id: Option<&str>) -> ProofContext {
    ProofContext {
        game_id: game_id.map(str::to_string),
        player_id: player_id.map(str::to_string),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
