pub mod backend;
pub mod ceremony;
pub mod clock;
pub mod config;
pub mod crypto_serde;
pub mod engine;
pub mod hashing;
pub mod keys;
pub mod macros;
pub mod proof_manager;
pub mod relations;
pub mod tokio_tools;

#[cfg(test)]
pub mod test_utils;

pub use backend::{Curve, Groth16Backend, ProofSystem, ScalarField};
pub use ceremony::{Ceremony, CeremonyError, CeremonyManager, CeremonyStatus, ContributionData};
pub use config::{poseidon_config, EngineConfig};
pub use engine::{Engine, EngineError};
pub use keys::{KeyMaterial, KeyRegistry};
pub use proof_manager::{Proof, ProofError, ProofManager, ProofRequest, ProofResult};
pub use relations::{RelationId, RelationWitness, Statement};
