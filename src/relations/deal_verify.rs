//! DealVerify: binds one hidden card to both its commitment and a deck position.
//!
//! Valid iff `card_value < 52`, `position < 52`,
//! `card_commitment = Hash(card_value, card_nonce)` and
//! `deck_commitment = Hash(card_value, position, deck_seed)`.

use ark_crypto_primitives::sponge::poseidon::PoseidonConfig;
use ark_crypto_primitives::sponge::Absorb;
use ark_ff::PrimeField;
use ark_r1cs_std::{alloc::AllocVar, eq::EqGadget, fields::fp::FpVar};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};
use ark_relations::ns;
use serde::{Deserialize, Serialize};

use super::{check_range, RelationError, RelationId, DECK_SIZE};
use crate::hashing::{enforce_less_than, poseidon_hash_gadget, CardHasher};
use crate::track_constraints;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(serialize = "F: PrimeField", deserialize = "F: PrimeField"))]
pub struct DealVerifyPublic<F: PrimeField> {
    #[serde(with = "crate::crypto_serde::field")]
    pub deck_commitment: F,
    #[serde(with = "crate::crypto_serde::field")]
    pub card_commitment: F,
    #[serde(with = "crate::crypto_serde::field")]
    pub position: F,
}

impl<F: PrimeField> DealVerifyPublic<F> {
    pub fn to_field_elements(&self) -> Vec<F> {
        vec![self.deck_commitment, self.card_commitment, self.position]
    }
}

#[derive(Clone, Debug)]
pub struct DealVerifyWitness<F: PrimeField> {
    pub public: DealVerifyPublic<F>,
    /// Integer view of `public.position`, kept for range validation.
    pub position: u64,
    pub card_value: u64,
    pub card_nonce: F,
    pub deck_seed: F,
}

impl<F: PrimeField + Absorb> DealVerifyWitness<F> {
    pub fn new(
        card_value: u64,
        position: u64,
        card_nonce: F,
        deck_seed: F,
        hasher: &CardHasher<F>,
    ) -> Self {
        let card = F::from(card_value);
        let position_f = F::from(position);
        Self {
            public: DealVerifyPublic {
                deck_commitment: hasher.hash(&[card, position_f, deck_seed]),
                card_commitment: hasher.hash(&[card, card_nonce]),
                position: position_f,
            },
            position,
            card_value,
            card_nonce,
            deck_seed,
        }
    }

    pub fn check(&self, hasher: &CardHasher<F>) -> Result<(), RelationError> {
        check_range("card_value", self.card_value, DECK_SIZE as u64)?;
        check_range("position", self.position, DECK_SIZE as u64)?;
        if F::from(self.position) != self.public.position {
            return Err(RelationError::HashMismatch("position"));
        }
        let card = F::from(self.card_value);
        if hasher.hash(&[card, self.card_nonce]) != self.public.card_commitment {
            return Err(RelationError::HashMismatch("card_commitment"));
        }
        if hasher.hash(&[card, self.public.position, self.deck_seed]) != self.public.deck_commitment
        {
            return Err(RelationError::HashMismatch("deck_commitment"));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct DealVerifyCircuit<F: PrimeField> {
    pub public: DealVerifyPublic<F>,
    pub card_value: F,
    pub card_nonce: F,
    pub deck_seed: F,
    poseidon: PoseidonConfig<F>,
}

impl<F: PrimeField> DealVerifyCircuit<F> {
    pub fn new(witness: DealVerifyWitness<F>, poseidon: PoseidonConfig<F>) -> Self {
        Self {
            public: witness.public,
            card_value: F::from(witness.card_value),
            card_nonce: witness.card_nonce,
            deck_seed: witness.deck_seed,
            poseidon,
        }
    }

    pub fn blank(poseidon: PoseidonConfig<F>) -> Self {
        Self {
            public: DealVerifyPublic {
                deck_commitment: F::zero(),
                card_commitment: F::zero(),
                position: F::zero(),
            },
            card_value: F::zero(),
            card_nonce: F::zero(),
            deck_seed: F::zero(),
            poseidon,
        }
    }
}

impl<F: PrimeField + Absorb> ConstraintSynthesizer<F> for DealVerifyCircuit<F> {
    fn generate_constraints(self, cs: ConstraintSystemRef<F>) -> Result<(), SynthesisError> {
        // Public inputs, in schema order
        let deck_commitment =
            FpVar::new_input(ns!(cs, "deck_commitment"), || Ok(self.public.deck_commitment))?;
        let card_commitment =
            FpVar::new_input(ns!(cs, "card_commitment"), || Ok(self.public.card_commitment))?;
        let position = FpVar::new_input(ns!(cs, "position"), || Ok(self.public.position))?;

        let card_value = FpVar::new_witness(ns!(cs, "card_value"), || Ok(self.card_value))?;
        let card_nonce = FpVar::new_witness(ns!(cs, "card_nonce"), || Ok(self.card_nonce))?;
        let deck_seed = FpVar::new_witness(ns!(cs, "deck_seed"), || Ok(self.deck_seed))?;

        track_constraints!(cs.clone(), RelationId::DealVerify, "ranges", {
            enforce_less_than(&card_value, DECK_SIZE as u64)?;
            enforce_less_than(&position, DECK_SIZE as u64)
        })?;

        let computed_card = poseidon_hash_gadget(
            cs.clone(),
            &self.poseidon,
            &[card_value.clone(), card_nonce],
        )?;
        computed_card.enforce_equal(&card_commitment)?;

        let computed_deck = poseidon_hash_gadget(
            cs.clone(),
            &self.poseidon,
            &[card_value, position, deck_seed],
        )?;
        computed_deck.enforce_equal(&deck_commitment)
    }
}
