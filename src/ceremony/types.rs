use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroize;

use crate::crypto_serde::decode_hex_bytes;
use crate::relations::RelationId;

pub type CeremonyId = String;
pub type ParticipantId = String;

/// Bytes drawn per randomness component by [`ContributionData::random`].
pub const COMPONENT_BYTES: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CeremonyStatus {
    Initialized,
    InProgress,
    Completed,
    Aborted,
}

impl CeremonyStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CeremonyStatus::Completed | CeremonyStatus::Aborted)
    }
}

impl fmt::Display for CeremonyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CeremonyStatus::Initialized => "initialized",
            CeremonyStatus::InProgress => "in_progress",
            CeremonyStatus::Completed => "completed",
            CeremonyStatus::Aborted => "aborted",
        })
    }
}

/// SHA-256 chain state of a ceremony.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StateHash([u8; 32]);

impl StateHash {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for StateHash {
    fn from(bytes: [u8; 32]) -> Self {
        StateHash::new(bytes)
    }
}

impl fmt::Display for StateHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for StateHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StateHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = decode_hex_bytes(&s).map_err(serde::de::Error::custom)?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            serde::de::Error::custom(format!("state hash must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(StateHash(bytes))
    }
}

/// One participant's private randomness. Wiped when dropped; only the chain state
/// it was folded into is retained.
#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionData {
    #[serde(with = "crate::crypto_serde::hex_bytes")]
    pub tau: Vec<u8>,
    #[serde(with = "crate::crypto_serde::hex_bytes")]
    pub alpha: Vec<u8>,
    #[serde(with = "crate::crypto_serde::hex_bytes")]
    pub beta: Vec<u8>,
    #[serde(with = "crate::crypto_serde::hex_bytes")]
    pub gamma: Vec<u8>,
    #[serde(with = "crate::crypto_serde::hex_bytes")]
    pub delta: Vec<u8>,
    #[serde(default, deserialize_with = "deserialize_hex_map")]
    pub relation_specific: BTreeMap<String, Vec<u8>>,
}

impl ContributionData {
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut component = || {
            let mut bytes = vec![0u8; COMPONENT_BYTES];
            rng.fill_bytes(&mut bytes);
            bytes
        };
        Self {
            tau: component(),
            alpha: component(),
            beta: component(),
            gamma: component(),
            delta: component(),
            relation_specific: BTreeMap::new(),
        }
    }

    /// Fixed components in fold order.
    pub(crate) fn components(&self) -> [(&'static str, &[u8]); 5] {
        [
            ("tau", self.tau.as_slice()),
            ("alpha", self.alpha.as_slice()),
            ("beta", self.beta.as_slice()),
            ("gamma", self.gamma.as_slice()),
            ("delta", self.delta.as_slice()),
        ]
    }

    /// Name of the first empty fixed component, if any.
    pub fn missing_component(&self) -> Option<&'static str> {
        self.components()
            .into_iter()
            .find(|(_, bytes)| bytes.is_empty())
            .map(|(name, _)| name)
    }
}

impl Zeroize for ContributionData {
    fn zeroize(&mut self) {
        self.tau.zeroize();
        self.alpha.zeroize();
        self.beta.zeroize();
        self.gamma.zeroize();
        self.delta.zeroize();
        for value in self.relation_specific.values_mut() {
            value.zeroize();
        }
        self.relation_specific.clear();
    }
}

impl Drop for ContributionData {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl fmt::Debug for ContributionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContributionData")
            .field("relation_specific", &self.relation_specific.keys())
            .finish_non_exhaustive()
    }
}

fn deserialize_hex_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<u8>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, value)| {
            decode_hex_bytes(&value)
                .map(|bytes| (key, bytes))
                .map_err(serde::de::Error::custom)
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Contribution {
    pub ceremony_id: CeremonyId,
    pub participant_id: ParticipantId,
    /// 1-based position in the ceremony's log.
    pub sequence: u32,
    pub applied_at: DateTime<Utc>,
    pub resulting_state: StateHash,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ceremony {
    pub id: CeremonyId,
    pub relation: RelationId,
    pub title: String,
    pub description: String,
    pub initiator: ParticipantId,
    /// Join order; the initiator is always first.
    pub participants: Vec<ParticipantId>,
    pub contributions: Vec<Contribution>,
    pub status: CeremonyStatus,
    pub current_state: StateHash,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub key_version: Option<u32>,
    pub abort_reason: Option<String>,
}

impl Ceremony {
    pub fn has_contributed(&self, participant: &str) -> bool {
        self.contributions
            .iter()
            .any(|contribution| contribution.participant_id == participant)
    }

    pub fn distinct_contributors(&self) -> usize {
        self.participants
            .iter()
            .filter(|participant| self.has_contributed(participant))
            .count()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CeremonyStatistics {
    pub total_ceremonies: usize,
    pub initialized: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub aborted: usize,
    pub total_contributions: usize,
    pub published_key_sets: usize,
}
