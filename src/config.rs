use std::path::Path;
use std::time::Duration;

use ark_crypto_primitives::sponge::poseidon::{find_poseidon_ark_and_mds, PoseidonConfig};
use ark_ff::PrimeField;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const POSEIDON_FULL_ROUNDS: usize = 8;
const POSEIDON_PARTIAL_ROUNDS: usize = 57;
const POSEIDON_ALPHA: u64 = 5;
const POSEIDON_RATE: usize = 2;
const POSEIDON_CAPACITY: usize = 1;

const DEFAULT_MIN_CONTRIBUTIONS: usize = 2;
const DEFAULT_PROOF_TIMEOUT_MS: u64 = 120_000;
const DEFAULT_HISTORY_CAPACITY: usize = 1_024;

/// Returns the Poseidon configuration backing every card hash, native and in-circuit.
///
/// Round constants and the MDS matrix come from the Grain LFSR so that both sides of a
/// proof agree on the permutation without shipping parameter files.
pub fn poseidon_config<F: PrimeField>() -> PoseidonConfig<F> {
    let (ark, mds) = find_poseidon_ark_and_mds::<F>(
        F::MODULUS_BIT_SIZE as u64,
        POSEIDON_RATE,
        POSEIDON_FULL_ROUNDS as u64,
        POSEIDON_PARTIAL_ROUNDS as u64,
        0,
    );
    PoseidonConfig::new(
        POSEIDON_FULL_ROUNDS,
        POSEIDON_PARTIAL_ROUNDS,
        POSEIDON_ALPHA,
        mds,
        ark,
        POSEIDON_RATE,
        POSEIDON_CAPACITY,
    )
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Runtime knobs shared by the ceremony and proof managers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Distinct contributors a ceremony needs before key material is published.
    pub min_contributions: usize,
    /// Upper bound on proofs being generated at the same time.
    pub max_parallel_proofs: usize,
    pub proof_timeout_ms: u64,
    pub history_capacity: usize,
    /// Seeds nonce and contribution randomness; `None` draws from the OS.
    pub rng_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_contributions: DEFAULT_MIN_CONTRIBUTIONS,
            max_parallel_proofs: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            proof_timeout_ms: DEFAULT_PROOF_TIMEOUT_MS,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            rng_seed: None,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_contributions == 0 {
            return Err(ConfigError::Invalid(
                "min_contributions must be at least 1".into(),
            ));
        }
        if self.max_parallel_proofs == 0 {
            return Err(ConfigError::Invalid(
                "max_parallel_proofs must be at least 1".into(),
            ));
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::Invalid(
                "history_capacity must be at least 1".into(),
            ));
        }
        if self.proof_timeout_ms == 0 {
            return Err(ConfigError::Invalid("proof_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn proof_timeout(&self) -> Duration {
        Duration::from_millis(self.proof_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_bn254::Fr;

    #[test]
    fn poseidon_parameters_have_expected_shape() {
        let config = poseidon_config::<Fr>();
        assert_eq!(config.rate, POSEIDON_RATE);
        assert_eq!(config.capacity, POSEIDON_CAPACITY);
        assert_eq!(config.ark.len(), POSEIDON_FULL_ROUNDS + POSEIDON_PARTIAL_ROUNDS);
        assert_eq!(config.mds.len(), POSEIDON_RATE + POSEIDON_CAPACITY);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config = EngineConfig::from_json_str(r#"{ "min_contributions": 3 }"#).unwrap();
        assert_eq!(config.min_contributions, 3);
        assert_eq!(config.history_capacity, DEFAULT_HISTORY_CAPACITY);
        assert_eq!(config.proof_timeout(), Duration::from_millis(DEFAULT_PROOF_TIMEOUT_MS));
    }

    #[test]
    fn zero_quorum_is_rejected() {
        let err = EngineConfig::from_json_str(r#"{ "min_contributions": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
