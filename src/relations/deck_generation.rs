//! DeckGeneration: the hidden deck is a permutation of `0..52` bound to a hidden seed.
//!
//! Valid iff every `deck[i] < 52`, `seed_hash = Hash(seed)`, `deck_hash = Hash(deck..)`
//! and `prod(x - deck[i]) == prod(x - i)` at `x = Hash(seed_hash, deck_hash)`.
//!
//! The deck itself is derived natively with [`derive_deck`]; anyone who later learns
//! the seed string can recompute it.

use ark_crypto_primitives::sponge::poseidon::PoseidonConfig;
use ark_crypto_primitives::sponge::Absorb;
use ark_ff::PrimeField;
use ark_r1cs_std::{alloc::AllocVar, eq::EqGadget, fields::fp::FpVar, fields::FieldVar};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};
use ark_relations::ns;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{check_range, RelationError, RelationId, DECK_SIZE};
use crate::hashing::{enforce_less_than, field_from_label, poseidon_hash_gadget, CardHasher};
use crate::track_constraints;

const DECK_RNG_DOMAIN: &[u8] = b"zk_card_engine/v1/deck-rng";
const SEED_FIELD_DOMAIN: &[u8] = b"zk_card_engine/v1/deck-seed";

/// Fisher-Yates shuffle of `0..52` driven by `StdRng` seeded with SHA-256 of the seed.
pub fn derive_deck(seed: &str) -> [u64; DECK_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(DECK_RNG_DOMAIN);
    hasher.update(seed.as_bytes());
    let rng_seed: [u8; 32] = hasher.finalize().into();

    let mut deck: [u64; DECK_SIZE] = std::array::from_fn(|i| i as u64);
    deck.shuffle(&mut StdRng::from_seed(rng_seed));
    deck
}

/// Field encoding of a deck seed string.
pub fn seed_to_field<F: PrimeField>(seed: &str) -> F {
    field_from_label(SEED_FIELD_DOMAIN, seed)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(serialize = "F: PrimeField", deserialize = "F: PrimeField"))]
pub struct DeckGenerationPublic<F: PrimeField> {
    #[serde(with = "crate::crypto_serde::field")]
    pub seed_hash: F,
    #[serde(with = "crate::crypto_serde::field")]
    pub deck_hash: F,
}

impl<F: PrimeField> DeckGenerationPublic<F> {
    pub fn to_field_elements(&self) -> Vec<F> {
        vec![self.seed_hash, self.deck_hash]
    }
}

#[derive(Clone, Debug)]
pub struct DeckGenerationWitness<F: PrimeField> {
    pub public: DeckGenerationPublic<F>,
    pub seed: F,
    pub deck: [u64; DECK_SIZE],
}

impl<F: PrimeField + Absorb> DeckGenerationWitness<F> {
    pub fn new(seed: F, deck: [u64; DECK_SIZE], hasher: &CardHasher<F>) -> Self {
        Self {
            public: DeckGenerationPublic {
                seed_hash: hasher.hash(&[seed]),
                deck_hash: hasher.hash_u64s(&deck),
            },
            seed,
            deck,
        }
    }

    /// Witness for the deck [`derive_deck`] produces from `seed`.
    pub fn from_seed(seed: &str, hasher: &CardHasher<F>) -> Self {
        Self::new(seed_to_field(seed), derive_deck(seed), hasher)
    }

    pub fn check(&self, hasher: &CardHasher<F>) -> Result<(), RelationError> {
        let mut seen = [false; DECK_SIZE];
        for (i, card) in self.deck.iter().enumerate() {
            check_range(format!("deck[{i}]"), *card, DECK_SIZE as u64)?;
            let slot = &mut seen[*card as usize];
            if *slot {
                return Err(RelationError::NotAPermutation);
            }
            *slot = true;
        }
        if hasher.hash(&[self.seed]) != self.public.seed_hash {
            return Err(RelationError::HashMismatch("seed_hash"));
        }
        if hasher.hash_u64s(&self.deck) != self.public.deck_hash {
            return Err(RelationError::HashMismatch("deck_hash"));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct DeckGenerationCircuit<F: PrimeField> {
    pub public: DeckGenerationPublic<F>,
    pub seed: F,
    pub deck: [F; DECK_SIZE],
    poseidon: PoseidonConfig<F>,
}

impl<F: PrimeField> DeckGenerationCircuit<F> {
    pub fn new(witness: DeckGenerationWitness<F>, poseidon: PoseidonConfig<F>) -> Self {
        Self {
            public: witness.public,
            seed: witness.seed,
            deck: witness.deck.map(F::from),
            poseidon,
        }
    }

    pub fn blank(poseidon: PoseidonConfig<F>) -> Self {
        Self {
            public: DeckGenerationPublic {
                seed_hash: F::zero(),
                deck_hash: F::zero(),
            },
            seed: F::zero(),
            deck: [F::zero(); DECK_SIZE],
            poseidon,
        }
    }
}

impl<F: PrimeField + Absorb> ConstraintSynthesizer<F> for DeckGenerationCircuit<F> {
    fn generate_constraints(self, cs: ConstraintSystemRef<F>) -> Result<(), SynthesisError> {
        let seed_hash = FpVar::new_input(ns!(cs, "seed_hash"), || Ok(self.public.seed_hash))?;
        let deck_hash = FpVar::new_input(ns!(cs, "deck_hash"), || Ok(self.public.deck_hash))?;

        let seed = FpVar::new_witness(ns!(cs, "seed"), || Ok(self.seed))?;
        let deck = self
            .deck
            .iter()
            .map(|card| FpVar::new_witness(ns!(cs, "deck_card"), || Ok(*card)))
            .collect::<Result<Vec<_>, _>>()?;

        track_constraints!(cs.clone(), RelationId::DeckGeneration, "card_ranges", {
            for card in &deck {
                enforce_less_than(card, DECK_SIZE as u64)?;
            }
            Ok::<(), SynthesisError>(())
        })?;

        let computed_seed = poseidon_hash_gadget(cs.clone(), &self.poseidon, &[seed])?;
        computed_seed.enforce_equal(&seed_hash)?;
        let computed_deck = poseidon_hash_gadget(cs.clone(), &self.poseidon, &deck)?;
        computed_deck.enforce_equal(&deck_hash)?;

        track_constraints!(cs.clone(), RelationId::DeckGeneration, "grand_product", {
            let challenge =
                poseidon_hash_gadget(cs.clone(), &self.poseidon, &[seed_hash, deck_hash])?;
            let mut dealt = FpVar::<F>::one();
            let mut canonical = FpVar::<F>::one();
            for (i, card) in deck.iter().enumerate() {
                dealt *= &challenge - card;
                canonical *= &challenge - F::from(i as u64);
            }
            dealt.enforce_equal(&canonical)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_deck_is_a_stable_permutation() {
        let deck = derive_deck("game-42");
        let mut sorted = deck;
        sorted.sort_unstable();
        assert_eq!(sorted, std::array::from_fn::<u64, DECK_SIZE, _>(|i| i as u64));
        assert_eq!(deck, derive_deck("game-42"));
        assert_ne!(deck, derive_deck("game-43"));
    }
}
