use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::relations::{RelationError, RelationId};

#[derive(Debug, Error)]
pub enum ProofError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("witness rejected: {0}")]
    Relation(#[from] RelationError),

    #[error("no key material published for relation `{0}`")]
    SetupNotReady(RelationId),

    #[error("proving failed: {0}")]
    Proving(String),

    #[error("malformed proof: {0}")]
    VerificationFault(String),

    #[error("proof generation exceeded {0:?}")]
    Timeout(Duration),
}

/// Stable error category relayed to callers alongside the message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofErrorKind {
    Validation,
    SetupNotReady,
    Proving,
    VerificationFault,
    Timeout,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofFailure {
    pub kind: ProofErrorKind,
    pub message: String,
}

impl ProofError {
    pub fn kind(&self) -> ProofErrorKind {
        match self {
            ProofError::Validation(_) | ProofError::Relation(_) => ProofErrorKind::Validation,
            ProofError::SetupNotReady(_) => ProofErrorKind::SetupNotReady,
            ProofError::Proving(_) => ProofErrorKind::Proving,
            ProofError::VerificationFault(_) => ProofErrorKind::VerificationFault,
            ProofError::Timeout(_) => ProofErrorKind::Timeout,
        }
    }

    pub fn to_failure(&self) -> ProofFailure {
        ProofFailure {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}
