//! CardCommitment: knowledge of `(card_value, nonce)` with `card_value < 52` opening
//! `commitment = Hash(card_value, nonce)`.

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
pub struct CardCommitmentPublic<F: PrimeField> {
    #[serde(with = "crate::crypto_serde::field")]
    pub commitment: F,
}

impl<F: PrimeField> CardCommitmentPublic<F> {
    pub fn to_field_elements(&self) -> Vec<F> {
        vec![self.commitment]
    }
}

#[derive(Clone, Debug)]
pub struct CardCommitmentWitness<F: PrimeField> {
    pub public: CardCommitmentPublic<F>,
    pub card_value: u64,
    pub nonce: F,
}

impl<F: PrimeField + Absorb> CardCommitmentWitness<F> {
    /// Builds an honest witness, computing the commitment from its opening.
    pub fn new(card_value: u64, nonce: F, hasher: &CardHasher<F>) -> Self {
        let commitment = hasher.hash(&[F::from(card_value), nonce]);
        Self {
            public: CardCommitmentPublic { commitment },
            card_value,
            nonce,
        }
    }

    pub fn check(&self, hasher: &CardHasher<F>) -> Result<(), RelationError> {
        check_range("card_value", self.card_value, DECK_SIZE as u64)?;
        if hasher.hash(&[F::from(self.card_value), self.nonce]) != self.public.commitment {
            return Err(RelationError::HashMismatch("commitment"));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct CardCommitmentCircuit<F: PrimeField> {
    pub public: CardCommitmentPublic<F>,
    pub card_value: F,
    pub nonce: F,
    poseidon: PoseidonConfig<F>,
}

impl<F: PrimeField> CardCommitmentCircuit<F> {
    pub fn new(witness: CardCommitmentWitness<F>, poseidon: PoseidonConfig<F>) -> Self {
        Self {
            public: witness.public,
            card_value: F::from(witness.card_value),
            nonce: witness.nonce,
            poseidon,
        }
    }

    pub fn blank(poseidon: PoseidonConfig<F>) -> Self {
        Self {
            public: CardCommitmentPublic {
                commitment: F::zero(),
            },
            card_value: F::zero(),
            nonce: F::zero(),
            poseidon,
        }
    }
}

impl<F: PrimeField + Absorb> ConstraintSynthesizer<F> for CardCommitmentCircuit<F> {
    fn generate_constraints(self, cs: ConstraintSystemRef<F>) -> Result<(), SynthesisError> {
        let commitment = FpVar::new_input(ns!(cs, "commitment"), || Ok(self.public.commitment))?;

        let card_value = FpVar::new_witness(ns!(cs, "card_value"), || Ok(self.card_value))?;
        let nonce = FpVar::new_witness(ns!(cs, "nonce"), || Ok(self.nonce))?;

        track_constraints!(cs.clone(), RelationId::CardCommitment, "card_range", {
            enforce_less_than(&card_value, DECK_SIZE as u64)
        })?;

        let computed = track_constraints!(cs.clone(), RelationId::CardCommitment, "commitment_hash", {
            poseidon_hash_gadget(cs.clone(), &self.poseidon, &[card_value, nonce])
        })?;
        computed.enforce_equal(&commitment)
    }
}
