//! The card hash used by every relation: Poseidon over the proof system's scalar field.

pub mod gadget;
pub mod native;

pub use gadget::{enforce_less_than, poseidon_hash_gadget};
pub use native::{field_from_label, CardHasher};
