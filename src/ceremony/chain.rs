//! SHA-256 contribution chain. Every write is length-prefixed so adjacent fields can
//! never be re-split into a colliding transcript.

use sha2::{Digest, Sha256};

use super::types::{ContributionData, StateHash};
use crate::relations::RelationId;

const DOMAIN_GENESIS: &[u8] = b"zk_card_engine/ceremony/genesis/v1";
const DOMAIN_CONTRIBUTION: &[u8] = b"zk_card_engine/ceremony/contribution/v1";
const DOMAIN_KEYS: &[u8] = b"zk_card_engine/ceremony/keys/v1";

fn finalize_hash(hasher: Sha256) -> StateHash {
    let digest: [u8; 32] = hasher.finalize().into();
    StateHash::from(digest)
}

fn write_len(hasher: &mut Sha256, len: usize) {
    hasher.update((len as u64).to_be_bytes());
}

fn write_bytes(hasher: &mut Sha256, bytes: &[u8]) {
    write_len(hasher, bytes.len());
    hasher.update(bytes);
}

fn write_str(hasher: &mut Sha256, value: &str) {
    write_bytes(hasher, value.as_bytes());
}

/// State before any contribution.
pub fn genesis_state(ceremony_id: &str, relation: RelationId, title: &str) -> StateHash {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_GENESIS);
    write_str(&mut hasher, ceremony_id);
    write_str(&mut hasher, relation.as_str());
    write_str(&mut hasher, title);
    finalize_hash(hasher)
}

/// Folds one contribution into `previous`. Not commutative: swapping two
/// contributions yields a different final state.
pub fn fold_contribution(
    previous: &StateHash,
    participant: &str,
    data: &ContributionData,
) -> StateHash {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_CONTRIBUTION);
    hasher.update(previous.as_bytes());
    write_str(&mut hasher, participant);
    for (name, bytes) in data.components() {
        write_str(&mut hasher, name);
        write_bytes(&mut hasher, bytes);
    }
    // BTreeMap iteration is key-sorted
    write_len(&mut hasher, data.relation_specific.len());
    for (key, value) in &data.relation_specific {
        write_str(&mut hasher, key);
        write_bytes(&mut hasher, value);
    }
    finalize_hash(hasher)
}

/// Seed for the key-generation RNG of a completed ceremony.
pub fn key_seed(final_state: &StateHash) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_KEYS);
    hasher.update(final_state.as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(fill: u8) -> ContributionData {
        ContributionData {
            tau: vec![fill; 4],
            alpha: vec![fill.wrapping_add(1); 4],
            beta: vec![fill.wrapping_add(2); 4],
            gamma: vec![fill.wrapping_add(3); 4],
            delta: vec![fill.wrapping_add(4); 4],
            relation_specific: Default::default(),
        }
    }

    #[test]
    fn genesis_depends_on_every_field() {
        let base = genesis_state("c-1", RelationId::CardCommitment, "setup");
        assert_eq!(base, genesis_state("c-1", RelationId::CardCommitment, "setup"));
        assert_ne!(base, genesis_state("c-2", RelationId::CardCommitment, "setup"));
        assert_ne!(base, genesis_state("c-1", RelationId::DealVerify, "setup"));
        assert_ne!(base, genesis_state("c-1", RelationId::CardCommitment, "setup2"));
    }

    #[test]
    fn contributions_do_not_commute() {
        let genesis = genesis_state("c-1", RelationId::CardCommitment, "setup");
        let (a, b) = (data(1), data(9));
        let ab = fold_contribution(&fold_contribution(&genesis, "alice", &a), "bob", &b);
        let ba = fold_contribution(&fold_contribution(&genesis, "bob", &b), "alice", &a);
        assert_ne!(ab, ba);
    }

    #[test]
    fn length_prefixes_separate_participant_from_components() {
        let genesis = StateHash::default();
        let mut shifted = data(1);
        shifted.tau.insert(0, b'x');
        assert_ne!(
            fold_contribution(&genesis, "alice", &data(1)),
            fold_contribution(&genesis, "alic", &shifted)
        );
    }

    #[test]
    fn relation_specific_entries_are_folded() {
        let genesis = StateHash::default();
        let mut extra = data(1);
        extra.relation_specific.insert("deck".into(), vec![7, 7]);
        assert_ne!(
            fold_contribution(&genesis, "alice", &data(1)),
            fold_contribution(&genesis, "alice", &extra)
        );
    }
}
