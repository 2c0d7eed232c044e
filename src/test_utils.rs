//! Shared helpers for relation, manager and serialization tests.

use ark_crypto_primitives::sponge::Absorb;
use ark_ff::PrimeField;
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystem};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

use crate::hashing::CardHasher;
use crate::relations::RelationWitness;

pub mod serde {
    use std::fmt::Debug;

    /// Assert that a value survives a serde_json round-trip using structural equality.
    pub fn assert_round_trip_eq<T>(value: &T)
    where
        T: ::serde::Serialize + ::serde::de::DeserializeOwned + PartialEq + Debug,
    {
        let json = serde_json::to_string(value).expect("serialization should succeed");
        let restored: T = serde_json::from_str(&json).expect("deserialization should succeed");
        assert_eq!(restored, *value, "serde_json round-trip altered the value");
    }
}

/// Routes debug events under `target` to the test's captured output for the current thread.
pub fn setup_test_tracing(target: &str) -> tracing::subscriber::DefaultGuard {
    let filter = EnvFilter::new(format!("{target}=debug"));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_span_events(FmtSpan::CLOSE)
                .with_test_writer(),
        )
        .with(filter)
        .set_default()
}

/// Synthesizes `witness` and names the first unsatisfied constraint, if any.
pub fn relation_satisfied<F: PrimeField + Absorb>(
    witness: RelationWitness<F>,
    hasher: &CardHasher<F>,
) -> Result<(), String> {
    let relation = witness.relation();
    let cs = ConstraintSystem::<F>::new_ref();
    witness
        .into_circuit(hasher.config())
        .generate_constraints(cs.clone())
        .map_err(|e| format!("{relation}: synthesis failed: {e:?}"))?;

    match cs.is_satisfied() {
        Ok(true) => Ok(()),
        Ok(false) => match cs.which_is_unsatisfied() {
            Ok(Some(name)) => Err(format!("{relation}: constraint '{name}' is not satisfied")),
            _ => Err(format!("{relation}: constraint system is not satisfied")),
        },
        Err(e) => Err(format!("{relation}: error checking satisfaction: {e:?}")),
    }
}
