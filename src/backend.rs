//! Groth16 over BN254 as the proving backend for every relation.
//!
//! Public inputs are passed to the verifier without the implicit leading one, so a
//! well-formed input vector always satisfies
//! ```text
//! public_inputs.len() + 1 == vk.gamma_abc_g1.len()
//! ```

use ark_bn254::{Bn254, Fr};
use ark_crypto_primitives::sponge::poseidon::PoseidonConfig;
use ark_groth16::{Groth16, PreparedVerifyingKey, Proof, ProvingKey, VerifyingKey};
use ark_relations::r1cs::SynthesisError;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize, SerializationError};
use ark_snark::SNARK;
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::relations::{RelationCircuit, RelationId, RelationWitness};

const LOG_TARGET: &str = "zk_card_engine::backend";

pub type Curve = Bn254;
pub type ScalarField = Fr;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("constraint synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),
    #[error("canonical (de)serialization failed: {0}")]
    Serialization(#[from] SerializationError),
    #[error("expected {expected} public inputs, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },
}

/// Key generation, proving and verification for the fixed set of card relations.
pub trait ProofSystem {
    type ProvingKey;
    type VerifyingKey;
    type PreparedVerifyingKey;
    type Proof;

    fn generate_keys<R: RngCore + CryptoRng>(
        &self,
        relation: RelationId,
        rng: &mut R,
    ) -> Result<(Self::ProvingKey, Self::VerifyingKey), BackendError>;

    fn prepare(&self, vk: &Self::VerifyingKey) -> Result<Self::PreparedVerifyingKey, BackendError>;

    fn prove<R: RngCore + CryptoRng>(
        &self,
        pk: &Self::ProvingKey,
        witness: RelationWitness<ScalarField>,
        rng: &mut R,
    ) -> Result<Self::Proof, BackendError>;

    /// `Ok(false)` is a well-formed proof that does not verify.
    fn verify(
        &self,
        pvk: &Self::PreparedVerifyingKey,
        public_inputs: &[ScalarField],
        proof: &Self::Proof,
    ) -> Result<bool, BackendError>;
}

#[derive(Clone, Debug)]
pub struct Groth16Backend {
    poseidon: PoseidonConfig<ScalarField>,
}

impl Groth16Backend {
    pub fn new(poseidon: PoseidonConfig<ScalarField>) -> Self {
        Self { poseidon }
    }

    pub fn poseidon(&self) -> &PoseidonConfig<ScalarField> {
        &self.poseidon
    }
}

impl ProofSystem for Groth16Backend {
    type ProvingKey = ProvingKey<Curve>;
    type VerifyingKey = VerifyingKey<Curve>;
    type PreparedVerifyingKey = PreparedVerifyingKey<Curve>;
    type Proof = Proof<Curve>;

    fn generate_keys<R: RngCore + CryptoRng>(
        &self,
        relation: RelationId,
        rng: &mut R,
    ) -> Result<(Self::ProvingKey, Self::VerifyingKey), BackendError> {
        let _span = tracing::info_span!(target: LOG_TARGET, "generate_keys", %relation).entered();
        let circuit = RelationCircuit::blank(relation, &self.poseidon);
        let (pk, vk) = Groth16::<Curve>::circuit_specific_setup(circuit, rng)?;
        tracing::debug!(
            target: LOG_TARGET,
            %relation,
            public_inputs = vk.gamma_abc_g1.len() - 1,
            "generated groth16 keys"
        );
        Ok((pk, vk))
    }

    fn prepare(&self, vk: &Self::VerifyingKey) -> Result<Self::PreparedVerifyingKey, BackendError> {
        Ok(Groth16::<Curve>::process_vk(vk)?)
    }

    fn prove<R: RngCore + CryptoRng>(
        &self,
        pk: &Self::ProvingKey,
        witness: RelationWitness<ScalarField>,
        rng: &mut R,
    ) -> Result<Self::Proof, BackendError> {
        let relation = witness.relation();
        let _span = tracing::debug_span!(target: LOG_TARGET, "prove", %relation).entered();
        let circuit = witness.into_circuit(&self.poseidon);
        Ok(Groth16::<Curve>::prove(pk, circuit, rng)?)
    }

    fn verify(
        &self,
        pvk: &Self::PreparedVerifyingKey,
        public_inputs: &[ScalarField],
        proof: &Self::Proof,
    ) -> Result<bool, BackendError> {
        let expected = pvk.vk.gamma_abc_g1.len() - 1;
        if public_inputs.len() != expected {
            return Err(BackendError::ArityMismatch {
                expected,
                actual: public_inputs.len(),
            });
        }
        Ok(Groth16::<Curve>::verify_with_processed_vk(
            pvk,
            public_inputs,
            proof,
        )?)
    }
}

pub fn encode_proof(proof: &Proof<Curve>) -> Result<Vec<u8>, BackendError> {
    let mut bytes = Vec::new();
    proof.serialize_compressed(&mut bytes)?;
    Ok(bytes)
}

pub fn decode_proof(bytes: &[u8]) -> Result<Proof<Curve>, BackendError> {
    Ok(Proof::<Curve>::deserialize_compressed(bytes)?)
}

/// Lowercase hex SHA-256 of the compressed verifying key.
pub fn verifying_key_fingerprint(vk: &VerifyingKey<Curve>) -> Result<String, BackendError> {
    let mut bytes = Vec::new();
    vk.serialize_compressed(&mut bytes)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::CardHasher;
    use crate::relations::CardCommitmentWitness;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn proves_and_verifies_card_commitment() {
        let hasher = CardHasher::<Fr>::new();
        let backend = Groth16Backend::new(hasher.config().clone());
        let mut rng = StdRng::seed_from_u64(7);

        let (pk, vk) = backend
            .generate_keys(RelationId::CardCommitment, &mut rng)
            .unwrap();
        let pvk = backend.prepare(&vk).unwrap();

        let witness = RelationWitness::CardCommitment(CardCommitmentWitness::new(
            10,
            Fr::from(777u64),
            &hasher,
        ));
        let inputs = witness.statement().public_inputs();
        let proof = backend.prove(&pk, witness, &mut rng).unwrap();

        let decoded = decode_proof(&encode_proof(&proof).unwrap()).unwrap();
        assert!(backend.verify(&pvk, &inputs, &decoded).unwrap());
        assert!(!backend.verify(&pvk, &[inputs[0] + Fr::from(1u64)], &decoded).unwrap());
        assert!(matches!(
            backend.verify(&pvk, &[], &decoded),
            Err(BackendError::ArityMismatch {
                expected: 1,
                actual: 0
            })
        ));
        assert_eq!(verifying_key_fingerprint(&vk).unwrap().len(), 64);
    }

    #[test]
    fn garbage_bytes_do_not_decode() {
        assert!(decode_proof(&[0xde, 0xad, 0xbe, 0xef]).is_err());
    }
}
