//! Builds relation witnesses from game-level inputs (decks, positions, ids).

use ark_ff::UniformRand;
use rand::RngCore;

use super::error::ProofError;
use crate::backend::ScalarField;
use crate::hashing::{field_from_label, CardHasher};
use crate::relations::{DealVerifyWitness, ShuffleVerifyWitness, DECK_SIZE, SHUFFLE_SAMPLE_SIZE};

const GAME_ID_DOMAIN: &[u8] = b"zk_card_engine/v1/game-id";

/// A 52-entry sequence holding every value in `0..52` exactly once.
pub fn validate_deck(name: &str, values: &[u64]) -> Result<[u64; DECK_SIZE], ProofError> {
    let deck: [u64; DECK_SIZE] = values.try_into().map_err(|_| {
        ProofError::Validation(format!(
            "{name} must hold {DECK_SIZE} entries, got {}",
            values.len()
        ))
    })?;
    let mut seen = [false; DECK_SIZE];
    for (i, value) in deck.iter().enumerate() {
        let slot = seen.get_mut(*value as usize).ok_or_else(|| {
            ProofError::Validation(format!("{name}[{i}] = {value} is outside [0, {DECK_SIZE})"))
        })?;
        if *slot {
            return Err(ProofError::Validation(format!(
                "{name}[{i}] = {value} appears more than once"
            )));
        }
        *slot = true;
    }
    Ok(deck)
}

/// Witness over the first eight shuffled positions.
///
/// `permutation[i]` is the original position of the card now at shuffled position `i`.
/// The sampled sources are sorted to form `original_cards`, and the local permutation
/// maps each sampled shuffled position to its source's index in that sorted list, so
/// `shuffled_cards[i] == original_cards[local[i]]` for the whole sample.
pub fn shuffle_sample(
    original_deck: &[u64],
    shuffled_deck: &[u64],
    permutation: &[u64],
    hasher: &CardHasher<ScalarField>,
) -> Result<ShuffleVerifyWitness<ScalarField>, ProofError> {
    let original = validate_deck("original_deck", original_deck)?;
    let shuffled = validate_deck("shuffled_deck", shuffled_deck)?;
    let permutation = validate_deck("permutation", permutation)?;

    // Catch a mismatched mapping here, since the circuit does not.
    if let Some(i) = (0..DECK_SIZE).find(|&i| shuffled[i] != original[permutation[i] as usize]) {
        return Err(ProofError::Validation(format!(
            "shuffled_deck[{i}] = {} but original_deck[permutation[{i}]] = {}",
            shuffled[i], original[permutation[i] as usize]
        )));
    }

    let mut sources: [u64; SHUFFLE_SAMPLE_SIZE] =
        std::array::from_fn(|i| permutation[i]);
    sources.sort_unstable();

    let original_cards = sources.map(|source| original[source as usize]);
    let shuffled_cards: [u64; SHUFFLE_SAMPLE_SIZE] = std::array::from_fn(|i| shuffled[i]);
    let mut local = [0u64; SHUFFLE_SAMPLE_SIZE];
    for (i, slot) in local.iter_mut().enumerate() {
        // Sources are distinct, so the search always hits.
        let index = sources
            .binary_search(&permutation[i])
            .map_err(|_| ProofError::Validation("sample source not found".into()))?;
        *slot = index as u64;
    }

    Ok(ShuffleVerifyWitness::new(
        original_cards,
        shuffled_cards,
        local,
        hasher,
    ))
}

/// One DealVerify witness per position, sharing a deck seed drawn for `game_id`.
pub fn dealing_witnesses<R: RngCore>(
    deck: &[u64],
    positions: &[u64],
    game_id: &str,
    hasher: &CardHasher<ScalarField>,
    rng: &mut R,
) -> Result<Vec<DealVerifyWitness<ScalarField>>, ProofError> {
    let deck = validate_deck("deck", deck)?;
    if positions.is_empty() {
        return Err(ProofError::Validation("no positions to deal".into()));
    }
    let mut dealt = [false; DECK_SIZE];
    for position in positions {
        let slot = dealt.get_mut(*position as usize).ok_or_else(|| {
            ProofError::Validation(format!("position {position} is outside [0, {DECK_SIZE})"))
        })?;
        if *slot {
            return Err(ProofError::Validation(format!(
                "position {position} is dealt twice"
            )));
        }
        *slot = true;
    }

    let game = field_from_label::<ScalarField>(GAME_ID_DOMAIN, game_id);
    let deck_seed = hasher.hash(&[game, ScalarField::rand(rng)]);

    Ok(positions
        .iter()
        .map(|&position| {
            let nonce = ScalarField::rand(rng);
            DealVerifyWitness::new(deck[position as usize], position, nonce, deck_seed, hasher)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn identity() -> Vec<u64> {
        (0..DECK_SIZE as u64).collect()
    }

    #[test]
    fn rejects_malformed_decks() {
        assert!(validate_deck("deck", &[0, 1, 2]).is_err());
        let mut repeated = identity();
        repeated[5] = 4;
        assert!(validate_deck("deck", &repeated).is_err());
        let mut out_of_range = identity();
        out_of_range[0] = 52;
        assert!(validate_deck("deck", &out_of_range).is_err());
        assert!(validate_deck("deck", &identity()).is_ok());
    }

    #[test]
    fn reversed_deck_sample_maps_back_to_sorted_sources() {
        let hasher = CardHasher::new();
        let original = identity();
        let shuffled: Vec<u64> = original.iter().rev().copied().collect();
        let permutation: Vec<u64> = shuffled
            .iter()
            .map(|card| original.iter().position(|c| c == card).unwrap() as u64)
            .collect();

        let witness = shuffle_sample(&original, &shuffled, &permutation, &hasher).unwrap();
        assert_eq!(witness.original_cards, [44, 45, 46, 47, 48, 49, 50, 51]);
        assert_eq!(witness.shuffled_cards, [51, 50, 49, 48, 47, 46, 45, 44]);
        assert_eq!(witness.permutation, [7, 6, 5, 4, 3, 2, 1, 0]);
        for i in 0..SHUFFLE_SAMPLE_SIZE {
            assert_eq!(
                witness.shuffled_cards[i],
                witness.original_cards[witness.permutation[i] as usize]
            );
        }
    }

    #[test]
    fn rejects_mapping_that_disagrees_with_decks() {
        let hasher = CardHasher::new();
        let original = identity();
        let shuffled: Vec<u64> = original.iter().rev().copied().collect();
        // Identity permutation does not explain a reversed deck.
        let err = shuffle_sample(&original, &shuffled, &identity(), &hasher).unwrap_err();
        assert!(matches!(err, ProofError::Validation(_)));
    }

    #[test]
    fn dealing_binds_each_position_to_its_card() {
        let hasher = CardHasher::new();
        let mut rng = StdRng::seed_from_u64(3);
        let deck: Vec<u64> = identity().into_iter().rev().collect();
        let witnesses = dealing_witnesses(&deck, &[0, 1, 2, 3], "g1", &hasher, &mut rng).unwrap();

        assert_eq!(witnesses.len(), 4);
        for (position, witness) in witnesses.iter().enumerate() {
            assert_eq!(witness.card_value, 51 - position as u64);
            assert_eq!(witness.check(&hasher), Ok(()));
        }
        assert!(witnesses
            .windows(2)
            .all(|pair| pair[0].deck_seed == pair[1].deck_seed));

        assert!(dealing_witnesses(&deck, &[1, 1], "g1", &hasher, &mut rng).is_err());
        assert!(dealing_witnesses(&deck, &[52], "g1", &hasher, &mut rng).is_err());
        assert!(dealing_witnesses(&deck, &[], "g1", &hasher, &mut rng).is_err());
    }
}
