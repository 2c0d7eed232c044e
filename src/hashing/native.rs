use ark_crypto_primitives::sponge::poseidon::{PoseidonConfig, PoseidonSponge};
use ark_crypto_primitives::sponge::{Absorb, CryptographicSponge};
use ark_ff::PrimeField;
use sha2::{Digest, Sha256};

use crate::config::poseidon_config;

/// Native Poseidon hasher; holds the parameters so callers don't regenerate them per hash.
#[derive(Clone, Debug)]
pub struct CardHasher<F: PrimeField> {
    config: PoseidonConfig<F>,
}

impl<F: PrimeField + Absorb> CardHasher<F> {
    pub fn new() -> Self {
        Self {
            config: poseidon_config::<F>(),
        }
    }

    pub fn from_config(config: PoseidonConfig<F>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PoseidonConfig<F> {
        &self.config
    }

    /// Hash(x1, .., xn): absorb the ordered inputs and squeeze one element.
    pub fn hash(&self, inputs: &[F]) -> F {
        let mut sponge = PoseidonSponge::<F>::new(&self.config);
        for input in inputs {
            sponge.absorb(input);
        }
        sponge.squeeze_field_elements::<F>(1)[0]
    }

    pub fn hash_u64s(&self, values: &[u64]) -> F {
        let elements: Vec<F> = values.iter().map(|v| F::from(*v)).collect();
        self.hash(&elements)
    }
}

impl<F: PrimeField + Absorb> Default for CardHasher<F> {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps an arbitrary label (seed string, game id) into the field via SHA-256.
pub fn field_from_label<F: PrimeField>(domain: &[u8], label: &str) -> F {
    let mut hasher = Sha256::new();
    hasher.update((domain.len() as u32).to_be_bytes());
    hasher.update(domain);
    hasher.update(label.as_bytes());
    F::from_le_bytes_mod_order(&hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_bn254::Fr;

    #[test]
    fn hash_is_deterministic_and_order_sensitive() {
        let hasher = CardHasher::<Fr>::new();
        let a = hasher.hash(&[Fr::from(10u64), Fr::from(777u64)]);
        let b = hasher.hash(&[Fr::from(10u64), Fr::from(777u64)]);
        let swapped = hasher.hash(&[Fr::from(777u64), Fr::from(10u64)]);
        assert_eq!(a, b);
        assert_ne!(a, swapped);
    }

    #[test]
    fn distinct_cards_hash_differently() {
        let hasher = CardHasher::<Fr>::new();
        let nonce = Fr::from(5u64);
        let hashes: Vec<Fr> = (0u64..52)
            .map(|card| hasher.hash(&[Fr::from(card), nonce]))
            .collect();
        for (i, h) in hashes.iter().enumerate() {
            assert!(hashes[i + 1..].iter().all(|other| other != h));
        }
    }

    #[test]
    fn labels_are_domain_separated() {
        let a: Fr = field_from_label(b"deck-seed", "game-42");
        let b: Fr = field_from_label(b"game-id", "game-42");
        assert_ne!(a, b);
        assert_eq!(a, field_from_label::<Fr>(b"deck-seed", "game-42"));
    }
}
