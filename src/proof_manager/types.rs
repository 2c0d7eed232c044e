use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{ProofError, ProofFailure};
use crate::backend::ScalarField;
use crate::relations::{RelationId, Statement};

pub type ProofId = String;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofMetadata {
    pub game_id: Option<String>,
    pub player_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One proven statement. Dealing proofs carry one per dealt position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofInstance {
    pub statement: Statement<ScalarField>,
    /// Compressed canonical Groth16 proof.
    #[serde(with = "crate::crypto_serde::hex_bytes")]
    pub proof_bytes: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proof {
    pub id: ProofId,
    pub relation: RelationId,
    /// Key material version the proof was produced under.
    pub key_version: u32,
    pub instances: Vec<ProofInstance>,
    pub metadata: ProofMetadata,
}

impl Proof {
    /// Public inputs per instance, in circuit allocation order.
    pub fn public_inputs(&self) -> Vec<Vec<ScalarField>> {
        self.instances
            .iter()
            .map(|instance| instance.statement.public_inputs())
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofResult {
    pub success: bool,
    pub proof: Option<Proof>,
    pub error: Option<ProofFailure>,
    pub processing_time_ms: u64,
    /// Set only when the batch asked for immediate verification.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub verified: Option<bool>,
}

impl ProofResult {
    pub fn succeeded(proof: Proof, processing_time_ms: u64) -> Self {
        Self {
            success: true,
            proof: Some(proof),
            error: None,
            processing_time_ms,
            verified: None,
        }
    }

    pub fn failed(error: &ProofError, processing_time_ms: u64) -> Self {
        Self {
            success: false,
            proof: None,
            error: Some(error.to_failure()),
            processing_time_ms,
            verified: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOutcome {
    pub proof_id: ProofId,
    pub valid: bool,
    pub error: Option<ProofFailure>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchVerificationResult {
    pub valid: bool,
    /// Ids of failing proofs, in input order.
    pub failures: Vec<ProofId>,
    pub results: Vec<VerificationOutcome>,
}

/// Domain-level request for one proof; what batch generation consumes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ProofRequest {
    DeckGeneration {
        seed: String,
    },
    CardCommitment {
        card_value: u64,
        #[serde(with = "crate::crypto_serde::field")]
        nonce: ScalarField,
        game_id: String,
        #[serde(default)]
        player_id: Option<String>,
    },
    CardShuffle {
        original_deck: Vec<u64>,
        shuffled_deck: Vec<u64>,
        permutation: Vec<u64>,
        game_id: String,
    },
    CardDealing {
        deck: Vec<u64>,
        positions: Vec<u64>,
        game_id: String,
        #[serde(default)]
        player_id: Option<String>,
    },
}

impl ProofRequest {
    pub fn relation(&self) -> RelationId {
        match self {
            ProofRequest::DeckGeneration { .. } => RelationId::DeckGeneration,
            ProofRequest::CardCommitment { .. } => RelationId::CardCommitment,
            ProofRequest::CardShuffle { .. } => RelationId::ShuffleVerify,
            ProofRequest::CardDealing { .. } => RelationId::DealVerify,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProofRequest {
    pub proofs: Vec<ProofRequest>,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub verify_immediately: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProofResult {
    /// Same order as the request.
    pub results: Vec<ProofResult>,
    pub successful: usize,
    pub failed: usize,
    pub total_time_ms: u64,
}
