//! ShuffleVerify over an 8-card sample.
//!
//! Enforced: every `permutation[i] < 8`, every `shuffled_cards[i] < 52`,
//! `original_hash = Hash(original_cards..)` and `shuffled_hash = Hash(shuffled_cards..)`.
//!
//! Not enforced: `shuffled_cards[i] == original_cards[permutation[i]]`. The permutation
//! is range-checked but never tied to the two card sequences, so a proof only shows that
//! two disclosed-by-hash sequences exist alongside an in-range index array. Callers that
//! need the mapping must check it outside the proof (the proof manager does so before
//! proving).

use ark_crypto_primitives::sponge::poseidon::PoseidonConfig;
use ark_crypto_primitives::sponge::Absorb;
use ark_ff::PrimeField;
use ark_r1cs_std::{alloc::AllocVar, eq::EqGadget, fields::fp::FpVar};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};
use ark_relations::ns;
use serde::{Deserialize, Serialize};

use super::{check_range, RelationError, RelationId, DECK_SIZE, SHUFFLE_SAMPLE_SIZE};
use crate::hashing::{enforce_less_than, poseidon_hash_gadget, CardHasher};
use crate::track_constraints;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(serialize = "F: PrimeField", deserialize = "F: PrimeField"))]
pub struct ShuffleVerifyPublic<F: PrimeField> {
    #[serde(with = "crate::crypto_serde::field")]
    pub original_hash: F,
    #[serde(with = "crate::crypto_serde::field")]
    pub shuffled_hash: F,
}

impl<F: PrimeField> ShuffleVerifyPublic<F> {
    pub fn to_field_elements(&self) -> Vec<F> {
        vec![self.original_hash, self.shuffled_hash]
    }
}

#[derive(Clone, Debug)]
pub struct ShuffleVerifyWitness<F: PrimeField> {
    pub public: ShuffleVerifyPublic<F>,
    pub original_cards: [u64; SHUFFLE_SAMPLE_SIZE],
    pub shuffled_cards: [u64; SHUFFLE_SAMPLE_SIZE],
    pub permutation: [u64; SHUFFLE_SAMPLE_SIZE],
}

impl<F: PrimeField + Absorb> ShuffleVerifyWitness<F> {
    pub fn new(
        original_cards: [u64; SHUFFLE_SAMPLE_SIZE],
        shuffled_cards: [u64; SHUFFLE_SAMPLE_SIZE],
        permutation: [u64; SHUFFLE_SAMPLE_SIZE],
        hasher: &CardHasher<F>,
    ) -> Self {
        Self {
            public: ShuffleVerifyPublic {
                original_hash: hasher.hash_u64s(&original_cards),
                shuffled_hash: hasher.hash_u64s(&shuffled_cards),
            },
            original_cards,
            shuffled_cards,
            permutation,
        }
    }

    pub fn check(&self, hasher: &CardHasher<F>) -> Result<(), RelationError> {
        for (i, (index, card)) in self.permutation.iter().zip(&self.shuffled_cards).enumerate() {
            check_range(format!("permutation[{i}]"), *index, SHUFFLE_SAMPLE_SIZE as u64)?;
            check_range(format!("shuffled_cards[{i}]"), *card, DECK_SIZE as u64)?;
        }
        if hasher.hash_u64s(&self.original_cards) != self.public.original_hash {
            return Err(RelationError::HashMismatch("original_hash"));
        }
        if hasher.hash_u64s(&self.shuffled_cards) != self.public.shuffled_hash {
            return Err(RelationError::HashMismatch("shuffled_hash"));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct ShuffleVerifyCircuit<F: PrimeField> {
    pub public: ShuffleVerifyPublic<F>,
    pub original_cards: [F; SHUFFLE_SAMPLE_SIZE],
    pub shuffled_cards: [F; SHUFFLE_SAMPLE_SIZE],
    pub permutation: [F; SHUFFLE_SAMPLE_SIZE],
    poseidon: PoseidonConfig<F>,
}

impl<F: PrimeField> ShuffleVerifyCircuit<F> {
    pub fn new(witness: ShuffleVerifyWitness<F>, poseidon: PoseidonConfig<F>) -> Self {
        Self {
            public: witness.public,
            original_cards: witness.original_cards.map(F::from),
            shuffled_cards: witness.shuffled_cards.map(F::from),
            permutation: witness.permutation.map(F::from),
            poseidon,
        }
    }

    pub fn blank(poseidon: PoseidonConfig<F>) -> Self {
        Self {
            public: ShuffleVerifyPublic {
                original_hash: F::zero(),
                shuffled_hash: F::zero(),
            },
            original_cards: [F::zero(); SHUFFLE_SAMPLE_SIZE],
            shuffled_cards: [F::zero(); SHUFFLE_SAMPLE_SIZE],
            permutation: [F::zero(); SHUFFLE_SAMPLE_SIZE],
            poseidon,
        }
    }
}

fn alloc_witness_array<F: PrimeField>(
    cs: &ConstraintSystemRef<F>,
    values: &[F; SHUFFLE_SAMPLE_SIZE],
) -> Result<Vec<FpVar<F>>, SynthesisError> {
    values
        .iter()
        .map(|value| FpVar::new_witness(cs.clone(), || Ok(*value)))
        .collect()
}

impl<F: PrimeField + Absorb> ConstraintSynthesizer<F> for ShuffleVerifyCircuit<F> {
    fn generate_constraints(self, cs: ConstraintSystemRef<F>) -> Result<(), SynthesisError> {
        let original_hash =
            FpVar::new_input(ns!(cs, "original_hash"), || Ok(self.public.original_hash))?;
        let shuffled_hash =
            FpVar::new_input(ns!(cs, "shuffled_hash"), || Ok(self.public.shuffled_hash))?;

        let original_cards = alloc_witness_array(&cs, &self.original_cards)?;
        let shuffled_cards = alloc_witness_array(&cs, &self.shuffled_cards)?;
        let permutation = alloc_witness_array(&cs, &self.permutation)?;

        track_constraints!(cs.clone(), RelationId::ShuffleVerify, "index_ranges", {
            for (index, card) in permutation.iter().zip(&shuffled_cards) {
                enforce_less_than(index, SHUFFLE_SAMPLE_SIZE as u64)?;
                enforce_less_than(card, DECK_SIZE as u64)?;
            }
            Ok::<(), SynthesisError>(())
        })?;

        let computed_original = poseidon_hash_gadget(cs.clone(), &self.poseidon, &original_cards)?;
        computed_original.enforce_equal(&original_hash)?;

        let computed_shuffled = poseidon_hash_gadget(cs.clone(), &self.poseidon, &shuffled_cards)?;
        computed_shuffled.enforce_equal(&shuffled_hash)
    }
}
