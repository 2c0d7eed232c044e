use thiserror::Error;

use super::types::{CeremonyId, CeremonyStatus, ParticipantId};
use crate::backend::BackendError;

#[derive(Debug, Error)]
pub enum CeremonyError {
    #[error("unknown relation `{0}`")]
    UnknownRelation(String),

    #[error("ceremony `{0}` not found")]
    UnknownCeremony(CeremonyId),

    #[error("cannot {operation} ceremony `{ceremony_id}` in state {status}")]
    InvalidState {
        ceremony_id: CeremonyId,
        status: CeremonyStatus,
        operation: &'static str,
    },

    #[error("participant `{participant}` already joined ceremony `{ceremony_id}`")]
    DuplicateParticipant {
        ceremony_id: CeremonyId,
        participant: ParticipantId,
    },

    #[error("participant `{participant}` is not registered on ceremony `{ceremony_id}`")]
    UnknownParticipant {
        ceremony_id: CeremonyId,
        participant: ParticipantId,
    },

    #[error("invalid contribution: {0}")]
    InvalidContribution(String),

    #[error("key generation failed: {0}")]
    KeyGeneration(#[from] BackendError),

    #[error("contribution task failed: {0}")]
    Task(String),
}

impl CeremonyError {
    /// Errors raised because the ceremony state machine forbids the operation.
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            CeremonyError::InvalidState { .. }
                | CeremonyError::DuplicateParticipant { .. }
                | CeremonyError::UnknownParticipant { .. }
        )
    }
}
