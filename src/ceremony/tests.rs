use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{TimeZone, Utc};
use rand::{rngs::StdRng, SeedableRng};

use super::*;
use crate::clock::{ManualClock, SequentialIdGenerator};
use crate::hashing::CardHasher;

fn manager_with(quorum: usize, registry: Arc<KeyRegistry>) -> CeremonyManager {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    CeremonyManager::new(
        registry,
        Arc::new(Groth16Backend::new(CardHasher::new().config().clone())),
        Arc::new(SequentialIdGenerator::new()),
        Arc::new(ManualClock::new(start)),
        quorum,
    )
}

fn manager(quorum: usize) -> CeremonyManager {
    manager_with(quorum, Arc::new(KeyRegistry::new()))
}

fn randomness(seed: u64) -> ContributionData {
    ContributionData::random(&mut StdRng::seed_from_u64(seed))
}

#[tokio::test]
async fn completes_after_quorum_of_distinct_contributors() {
    let registry = Arc::new(KeyRegistry::new());
    let manager = manager_with(2, Arc::clone(&registry));
    let ceremony = manager
        .initialize_ceremony("card_commitment", "commitment keys", "", "alice")
        .unwrap();
    assert_eq!(ceremony.status, CeremonyStatus::Initialized);
    manager.add_participant(&ceremony.id, "bob").unwrap();

    let first = manager
        .make_contribution(&ceremony.id, "alice", randomness(1))
        .await
        .unwrap();
    assert_eq!(first.status, CeremonyStatus::InProgress);
    assert!(first.key_material.is_none());

    // A repeat contribution is chained but does not count toward quorum.
    let repeat = manager
        .make_contribution(&ceremony.id, "alice", randomness(2))
        .await
        .unwrap();
    assert_eq!(repeat.status, CeremonyStatus::InProgress);
    assert_ne!(repeat.contribution.resulting_state, first.contribution.resulting_state);
    assert!(registry.latest(RelationId::CardCommitment).is_none());

    let last = manager
        .make_contribution(&ceremony.id, "bob", randomness(3))
        .await
        .unwrap();
    assert_eq!(last.status, CeremonyStatus::Completed);
    let material = last.key_material.unwrap();
    assert_eq!(material.version, 1);
    assert_eq!(material.final_state, last.contribution.resulting_state);

    let status = manager.get_ceremony_status(&ceremony.id).unwrap();
    assert_eq!(status.contributions.len(), 3);
    assert_eq!(status.key_version, Some(1));
    assert!(status.completed_at.is_some());
    assert_eq!(
        registry.latest(RelationId::CardCommitment).unwrap().fingerprint,
        material.fingerprint
    );
}

#[tokio::test]
async fn terminal_ceremonies_reject_changes() {
    let manager = manager(1);
    let ceremony = manager
        .initialize_ceremony("card_commitment", "t", "", "alice")
        .unwrap();
    manager
        .make_contribution(&ceremony.id, "alice", randomness(1))
        .await
        .unwrap();

    let join = manager.add_participant(&ceremony.id, "bob").unwrap_err();
    assert!(join.is_state_error());
    let contribute = manager
        .make_contribution(&ceremony.id, "alice", randomness(2))
        .await
        .unwrap_err();
    assert!(matches!(
        contribute,
        CeremonyError::InvalidState {
            status: CeremonyStatus::Completed,
            ..
        }
    ));
    assert!(manager.abort_ceremony(&ceremony.id, "late").is_err());
}

#[tokio::test]
async fn rejects_unknown_inputs() {
    let manager = manager(2);
    assert!(matches!(
        manager.initialize_ceremony("poker_hand", "t", "", "alice"),
        Err(CeremonyError::UnknownRelation(_))
    ));
    assert!(matches!(
        manager.get_ceremony_status("ceremony-404"),
        Err(CeremonyError::UnknownCeremony(_))
    ));

    let ceremony = manager
        .initialize_ceremony("deal_verify", "t", "", "alice")
        .unwrap();
    assert!(matches!(
        manager.add_participant(&ceremony.id, "alice"),
        Err(CeremonyError::DuplicateParticipant { .. })
    ));
    assert!(matches!(
        manager
            .make_contribution(&ceremony.id, "mallory", randomness(1))
            .await,
        Err(CeremonyError::UnknownParticipant { .. })
    ));

    let mut empty = randomness(2);
    empty.gamma.clear();
    assert!(matches!(
        manager.make_contribution(&ceremony.id, "alice", empty).await,
        Err(CeremonyError::InvalidContribution(_))
    ));

    let status = manager.get_ceremony_status(&ceremony.id).unwrap();
    assert_eq!(status.status, CeremonyStatus::Initialized);
    assert!(status.contributions.is_empty());
}

#[tokio::test]
async fn aborted_ceremonies_leave_the_active_list() {
    let manager = manager(2);
    let kept = manager
        .initialize_ceremony("card_commitment", "kept", "", "alice")
        .unwrap();
    let dropped = manager
        .initialize_ceremony("shuffle_verify", "dropped", "", "alice")
        .unwrap();

    let aborted = manager.abort_ceremony(&dropped.id, "operator request").unwrap();
    assert_eq!(aborted.status, CeremonyStatus::Aborted);
    assert_eq!(aborted.abort_reason.as_deref(), Some("operator request"));
    assert!(manager
        .make_contribution(&dropped.id, "alice", randomness(1))
        .await
        .unwrap_err()
        .is_state_error());

    let active: Vec<_> = manager
        .list_active_ceremonies()
        .into_iter()
        .map(|ceremony| ceremony.id)
        .collect();
    assert_eq!(active, vec![kept.id]);

    let stats = manager.get_statistics();
    assert_eq!(stats.total_ceremonies, 2);
    assert_eq!(stats.initialized, 1);
    assert_eq!(stats.aborted, 1);
    assert_eq!(stats.published_key_sets, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_contributions_are_serialized() {
    let manager = Arc::new(manager(10));
    let participants = ["p1", "p2", "p3", "p4", "p5", "p6"];
    let ceremony = manager
        .initialize_ceremony("card_commitment", "race", "", participants[0])
        .unwrap();
    for participant in &participants[1..] {
        manager.add_participant(&ceremony.id, *participant).unwrap();
    }

    let tasks: Vec<_> = participants
        .iter()
        .enumerate()
        .map(|(i, participant)| {
            let manager = Arc::clone(&manager);
            let id = ceremony.id.clone();
            let participant = participant.to_string();
            tokio::spawn(async move {
                manager
                    .make_contribution(&id, participant, randomness(i as u64))
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    // Replaying the log in recorded order must reproduce the final state.
    let status = manager.get_ceremony_status(&ceremony.id).unwrap();
    let mut state = chain::genesis_state(&status.id, status.relation, &status.title);
    for (expected_sequence, contribution) in status.contributions.iter().enumerate() {
        assert_eq!(contribution.sequence as usize, expected_sequence + 1);
        let index = participants
            .iter()
            .position(|p| *p == contribution.participant_id)
            .unwrap();
        state = chain::fold_contribution(
            &state,
            &contribution.participant_id,
            &randomness(index as u64),
        );
        assert_eq!(state, contribution.resulting_state);
    }
    assert_eq!(state, status.current_state);
    assert_eq!(status.contributions.len(), participants.len());
}

#[tokio::test]
async fn key_material_is_a_function_of_the_chain() {
    async fn run() -> Arc<KeyMaterial> {
        let manager = manager(1);
        let ceremony = manager
            .initialize_ceremony("card_commitment", "det", "", "alice")
            .unwrap();
        manager
            .make_contribution(&ceremony.id, "alice", randomness(42))
            .await
            .unwrap()
            .key_material
            .unwrap()
    }

    let (a, b) = (run().await, run().await);
    assert_eq!(a.final_state, b.final_state);
    assert_eq!(a.fingerprint, b.fingerprint);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn status_reads_do_not_wait_on_key_derivation() {
    let manager = Arc::new(manager(1));
    let ceremony = manager
        .initialize_ceremony("deck_generation", "deck keys", "", "alice")
        .unwrap();

    let contribution = {
        let manager = Arc::clone(&manager);
        let id = ceremony.id.clone();
        tokio::spawn(async move { manager.make_contribution(&id, "alice", randomness(7)).await })
    };

    let mut reads_before_commit = 0;
    let mut slowest_read = Duration::ZERO;
    while !contribution.is_finished() {
        let started = Instant::now();
        let stats = manager.get_statistics();
        let status = manager.get_ceremony_status(&ceremony.id).unwrap();
        slowest_read = slowest_read.max(started.elapsed());
        if status.status == CeremonyStatus::Initialized {
            assert_eq!(stats.initialized, 1);
            assert_eq!(stats.in_progress, 0);
            assert_eq!(stats.total_contributions, 0);
            reads_before_commit += 1;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let outcome = contribution.await.unwrap().unwrap();
    assert_eq!(outcome.status, CeremonyStatus::Completed);
    assert!(
        reads_before_commit >= 2,
        "only {reads_before_commit} reads completed while keys were being derived"
    );
    assert!(slowest_read < Duration::from_millis(250), "slowest read took {slowest_read:?}");
    assert_eq!(manager.get_statistics().completed, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn abort_during_key_derivation_discards_the_keys() {
    let registry = Arc::new(KeyRegistry::new());
    let manager = Arc::new(manager_with(1, Arc::clone(&registry)));
    let ceremony = manager
        .initialize_ceremony("deck_generation", "deck keys", "", "alice")
        .unwrap();

    let contribution = {
        let manager = Arc::clone(&manager);
        let id = ceremony.id.clone();
        tokio::spawn(async move { manager.make_contribution(&id, "alice", randomness(7)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let aborted = manager.abort_ceremony(&ceremony.id, "table closed").unwrap();
    assert_eq!(aborted.status, CeremonyStatus::Aborted);

    let err = contribution.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        CeremonyError::InvalidState {
            status: CeremonyStatus::Aborted,
            ..
        }
    ));
    let status = manager.get_ceremony_status(&ceremony.id).unwrap();
    assert!(status.contributions.is_empty());
    assert_eq!(status.key_version, None);
    assert_eq!(registry.published_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn queued_contributions_commit_in_arrival_order() {
    let manager = Arc::new(manager(10));
    let participants = ["p1", "p2", "p3", "p4"];
    let ceremony = manager
        .initialize_ceremony("card_commitment", "queue", "", participants[0])
        .unwrap();
    for participant in &participants[1..] {
        manager.add_participant(&ceremony.id, *participant).unwrap();
    }

    // Hold the turn so every contribution below has to queue for it.
    let slot = manager.slot(&ceremony.id).unwrap();
    let turn = slot.turn.lock().await;

    let mut tasks = Vec::new();
    for (i, participant) in participants.iter().enumerate() {
        let manager = Arc::clone(&manager);
        let id = ceremony.id.clone();
        let participant = participant.to_string();
        tasks.push(tokio::spawn(async move {
            manager
                .make_contribution(&id, participant, randomness(i as u64))
                .await
        }));
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // Readers are not held up by the queue.
    let waiting = manager.get_ceremony_status(&ceremony.id).unwrap();
    assert_eq!(waiting.status, CeremonyStatus::Initialized);
    drop(turn);

    for task in tasks {
        task.await.unwrap().unwrap();
    }
    let status = manager.get_ceremony_status(&ceremony.id).unwrap();
    let order: Vec<&str> = status
        .contributions
        .iter()
        .map(|c| c.participant_id.as_str())
        .collect();
    assert_eq!(order, participants);
}
