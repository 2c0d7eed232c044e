//! Constraint relations proven about hidden cards.
//!
//! Each relation fixes an ordered public-input schema. The order in which a circuit
//! allocates its `new_input` variables is the order [`Statement::public_inputs`] emits
//! field elements, and verification depends on the two agreeing exactly:
//!
//! | relation          | public inputs                                  |
//! |-------------------|------------------------------------------------|
//! | `card_commitment` | commitment                                     |
//! | `deal_verify`     | deck_commitment, card_commitment, position     |
//! | `shuffle_verify`  | original_hash, shuffled_hash                   |
//! | `deck_generation` | seed_hash, deck_hash                           |

pub mod card_commitment;
pub mod deal_verify;
pub mod deck_generation;
pub mod shuffle_verify;


use std::fmt;
use std::str::FromStr;

use ark_crypto_primitives::sponge::poseidon::PoseidonConfig;
use ark_crypto_primitives::sponge::Absorb;
use ark_ff::PrimeField;
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hashing::CardHasher;

pub use card_commitment::{CardCommitmentCircuit, CardCommitmentPublic, CardCommitmentWitness};
pub use deal_verify::{DealVerifyCircuit, DealVerifyPublic, DealVerifyWitness};
pub use deck_generation::{DeckGenerationCircuit, DeckGenerationPublic, DeckGenerationWitness};
pub use shuffle_verify::{ShuffleVerifyCircuit, ShuffleVerifyPublic, ShuffleVerifyWitness};

pub const DECK_SIZE: usize = 52;
pub const SHUFFLE_SAMPLE_SIZE: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationId {
    CardCommitment,
    DealVerify,
    ShuffleVerify,
    DeckGeneration,
}

impl RelationId {
    pub const ALL: [RelationId; 4] = [
        RelationId::CardCommitment,
        RelationId::DealVerify,
        RelationId::ShuffleVerify,
        RelationId::DeckGeneration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationId::CardCommitment => "card_commitment",
            RelationId::DealVerify => "deal_verify",
            RelationId::ShuffleVerify => "shuffle_verify",
            RelationId::DeckGeneration => "deck_generation",
        }
    }

    pub fn schema(&self) -> RelationSchema {
        match self {
            RelationId::CardCommitment => RelationSchema {
                relation: *self,
                public_inputs: &["commitment"],
                private_inputs: &["card_value", "nonce"],
            },
            RelationId::DealVerify => RelationSchema {
                relation: *self,
                public_inputs: &["deck_commitment", "card_commitment", "position"],
                private_inputs: &["card_value", "card_nonce", "deck_seed"],
            },
            RelationId::ShuffleVerify => RelationSchema {
                relation: *self,
                public_inputs: &["original_hash", "shuffled_hash"],
                private_inputs: &["original_cards[8]", "shuffled_cards[8]", "permutation[8]"],
            },
            RelationId::DeckGeneration => RelationSchema {
                relation: *self,
                public_inputs: &["seed_hash", "deck_hash"],
                private_inputs: &["seed", "deck[52]"],
            },
        }
    }
}

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationId {
    type Err = RelationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RelationId::ALL
            .into_iter()
            .find(|relation| relation.as_str() == s)
            .ok_or_else(|| RelationError::UnknownRelation(s.to_string()))
    }
}

/// Ordered field names of a relation's inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RelationSchema {
    pub relation: RelationId,
    pub public_inputs: &'static [&'static str],
    pub private_inputs: &'static [&'static str],
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelationError {
    #[error("unknown relation `{0}`")]
    UnknownRelation(String),
    #[error("{field} = {value} is outside [0, {bound})")]
    OutOfRange {
        field: String,
        value: u64,
        bound: u64,
    },
    #[error("{0} does not match the hash of its preimage")]
    HashMismatch(&'static str),
    #[error("deck is not a permutation of 0..{}", DECK_SIZE)]
    NotAPermutation,
}

pub(crate) fn check_range(field: impl Into<String>, value: u64, bound: u64) -> Result<(), RelationError> {
    if value < bound {
        Ok(())
    } else {
        Err(RelationError::OutOfRange {
            field: field.into(),
            value,
            bound,
        })
    }
}

/// Public half of a witness, tagged by relation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "relation",
    rename_all = "snake_case",
    bound(serialize = "F: PrimeField", deserialize = "F: PrimeField")
)]
pub enum Statement<F: PrimeField> {
    CardCommitment(CardCommitmentPublic<F>),
    DealVerify(DealVerifyPublic<F>),
    ShuffleVerify(ShuffleVerifyPublic<F>),
    DeckGeneration(DeckGenerationPublic<F>),
}

impl<F: PrimeField> Statement<F> {
    pub fn relation(&self) -> RelationId {
        match self {
            Statement::CardCommitment(_) => RelationId::CardCommitment,
            Statement::DealVerify(_) => RelationId::DealVerify,
            Statement::ShuffleVerify(_) => RelationId::ShuffleVerify,
            Statement::DeckGeneration(_) => RelationId::DeckGeneration,
        }
    }

    /// Public inputs in circuit allocation order.
    pub fn public_inputs(&self) -> Vec<F> {
        match self {
            Statement::CardCommitment(public) => public.to_field_elements(),
            Statement::DealVerify(public) => public.to_field_elements(),
            Statement::ShuffleVerify(public) => public.to_field_elements(),
            Statement::DeckGeneration(public) => public.to_field_elements(),
        }
    }
}

/// Full assignment (public and private) for one relation.
#[derive(Clone, Debug)]
pub enum RelationWitness<F: PrimeField> {
    CardCommitment(CardCommitmentWitness<F>),
    DealVerify(DealVerifyWitness<F>),
    ShuffleVerify(ShuffleVerifyWitness<F>),
    DeckGeneration(DeckGenerationWitness<F>),
}

impl<F: PrimeField + Absorb> RelationWitness<F> {
    pub fn relation(&self) -> RelationId {
        match self {
            RelationWitness::CardCommitment(_) => RelationId::CardCommitment,
            RelationWitness::DealVerify(_) => RelationId::DealVerify,
            RelationWitness::ShuffleVerify(_) => RelationId::ShuffleVerify,
            RelationWitness::DeckGeneration(_) => RelationId::DeckGeneration,
        }
    }

    pub fn statement(&self) -> Statement<F> {
        match self {
            RelationWitness::CardCommitment(w) => Statement::CardCommitment(w.public),
            RelationWitness::DealVerify(w) => Statement::DealVerify(w.public),
            RelationWitness::ShuffleVerify(w) => Statement::ShuffleVerify(w.public),
            RelationWitness::DeckGeneration(w) => Statement::DeckGeneration(w.public),
        }
    }

    /// Evaluates the relation natively; mirrors exactly what the circuit enforces.
    pub fn check(&self, hasher: &CardHasher<F>) -> Result<(), RelationError> {
        match self {
            RelationWitness::CardCommitment(w) => w.check(hasher),
            RelationWitness::DealVerify(w) => w.check(hasher),
            RelationWitness::ShuffleVerify(w) => w.check(hasher),
            RelationWitness::DeckGeneration(w) => w.check(hasher),
        }
    }

    pub fn into_circuit(self, poseidon: &PoseidonConfig<F>) -> RelationCircuit<F> {
        match self {
            RelationWitness::CardCommitment(w) => {
                RelationCircuit::CardCommitment(CardCommitmentCircuit::new(w, poseidon.clone()))
            }
            RelationWitness::DealVerify(w) => {
                RelationCircuit::DealVerify(DealVerifyCircuit::new(w, poseidon.clone()))
            }
            RelationWitness::ShuffleVerify(w) => {
                RelationCircuit::ShuffleVerify(ShuffleVerifyCircuit::new(w, poseidon.clone()))
            }
            RelationWitness::DeckGeneration(w) => {
                RelationCircuit::DeckGeneration(DeckGenerationCircuit::new(w, poseidon.clone()))
            }
        }
    }
}

/// Circuit for any relation; what key generation and proving hand to Groth16.
#[derive(Clone)]
pub enum RelationCircuit<F: PrimeField> {
    CardCommitment(CardCommitmentCircuit<F>),
    DealVerify(DealVerifyCircuit<F>),
    ShuffleVerify(ShuffleVerifyCircuit<F>),
    DeckGeneration(DeckGenerationCircuit<F>),
}

impl<F: PrimeField + Absorb> RelationCircuit<F> {
    /// Zero-assigned instance with the relation's shape, used for key generation.
    pub fn blank(relation: RelationId, poseidon: &PoseidonConfig<F>) -> Self {
        match relation {
            RelationId::CardCommitment => {
                RelationCircuit::CardCommitment(CardCommitmentCircuit::blank(poseidon.clone()))
            }
            RelationId::DealVerify => {
                RelationCircuit::DealVerify(DealVerifyCircuit::blank(poseidon.clone()))
            }
            RelationId::ShuffleVerify => {
                RelationCircuit::ShuffleVerify(ShuffleVerifyCircuit::blank(poseidon.clone()))
            }
            RelationId::DeckGeneration => {
                RelationCircuit::DeckGeneration(DeckGenerationCircuit::blank(poseidon.clone()))
            }
        }
    }

    pub fn relation(&self) -> RelationId {
        match self {
            RelationCircuit::CardCommitment(_) => RelationId::CardCommitment,
            RelationCircuit::DealVerify(_) => RelationId::DealVerify,
            RelationCircuit::ShuffleVerify(_) => RelationId::ShuffleVerify,
            RelationCircuit::DeckGeneration(_) => RelationId::DeckGeneration,
        }
    }
}

impl<F: PrimeField + Absorb> ConstraintSynthesizer<F> for RelationCircuit<F> {
    fn generate_constraints(self, cs: ConstraintSystemRef<F>) -> Result<(), SynthesisError> {
        match self {
            RelationCircuit::CardCommitment(circuit) => circuit.generate_constraints(cs),
            RelationCircuit::DealVerify(circuit) => circuit.generate_constraints(cs),
            RelationCircuit::ShuffleVerify(circuit) => circuit.generate_constraints(cs),
            RelationCircuit::DeckGeneration(circuit) => circuit.generate_constraints(cs),
        }
    }
}
