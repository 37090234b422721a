use std::sync::{Arc, Mutex};
use std::time::Duration;

use questgate_common::{CardRecord, GoalKind};
use questgate_engine::{
    ChannelProgress, FailureKind, NoProgress, NullifierStore, ProofOrchestrator, ProvingState,
    SessionError, StoreError, SubmitError,
};
use questgate_test_fixtures::{
    fixture_clock, fixtures, RecordingSubmitter, ScriptedProver, EXPIRED_QUEST_ID, TEAM_QUEST_ID,
};
use tokio_util::sync::CancellationToken;

type Orchestrator = ProofOrchestrator<Arc<ScriptedProver>, Arc<RecordingSubmitter>>;

fn orchestrator(
    prover: &Arc<ScriptedProver>,
    submitter: &Arc<RecordingSubmitter>,
    store: &NullifierStore,
) -> Orchestrator {
    ProofOrchestrator::new(Arc::clone(prover), Arc::clone(submitter), store.clone())
        .with_clock(fixture_clock())
}

fn recorder() -> (Arc<Mutex<Vec<ProvingState>>>, impl Fn(&ProvingState) + Send + Sync) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |state: &ProvingState| sink.lock().unwrap().push(*state))
}

#[tokio::test]
async fn commits_collection_signatures_after_submission() {
    let goal = fixtures().quest(TEAM_QUEST_ID);
    let prover = Arc::new(ScriptedProver::honest());
    let submitter = Arc::new(RecordingSubmitter::accepting(30));
    let store = NullifierStore::in_memory();
    let (seen, listener) = recorder();

    let outcome = orchestrator(&prover, &submitter, &store)
        .run(goal, fixtures().cards(), &listener)
        .await
        .unwrap();

    assert_eq!(outcome.score_delta, 30);
    assert_eq!(outcome.proofs_submitted, 4);
    assert_eq!(outcome.newly_nullified, 3);
    assert_eq!(prover.proved()[0], "sig-team-40");

    let completed: Vec<_> = seen.lock().unwrap().iter().map(|s| s.num_proofs_completed).collect();
    assert_eq!(completed, vec![1, 2, 3, 4]);
    assert!(seen.lock().unwrap().iter().all(|s| s.num_proofs_total == 4));

    assert_eq!(submitter.calls(), 1);
    let (goal_id, bundle) = &submitter.bundles()[0];
    assert_eq!(*goal_id, TEAM_QUEST_ID);
    assert_eq!(bundle.prerequisite_count, 1);

    let spent = store.query(GoalKind::Quest, TEAM_QUEST_ID).unwrap();
    assert_eq!(spent.len(), 3);
    assert!(!spent.contains("sig-team-40"));
    assert!(store.query(GoalKind::Power, TEAM_QUEST_ID).unwrap().is_empty());
}

#[tokio::test]
async fn spent_signatures_are_not_proved_again() {
    let goal = fixtures().quest(TEAM_QUEST_ID);
    let prover = Arc::new(ScriptedProver::honest());
    let submitter = Arc::new(RecordingSubmitter::accepting(10));
    let store = NullifierStore::in_memory();
    store
        .merge(GoalKind::Quest, TEAM_QUEST_ID, ["sig-frog-1"])
        .unwrap();

    let outcome = orchestrator(&prover, &submitter, &store)
        .run(goal, fixtures().cards(), &NoProgress)
        .await
        .unwrap();

    assert_eq!(outcome.proofs_submitted, 3);
    assert!(!prover.proved().contains(&"sig-frog-1".to_string()));
    assert_eq!(outcome.nullified, vec!["sig-frog-2", "sig-fox-1"]);

    // The same signature under a different scope is still eligible.
    let spent_power = store.query(GoalKind::Power, TEAM_QUEST_ID).unwrap();
    assert!(spent_power.is_empty());
}

#[tokio::test]
async fn second_session_reports_already_submitted() {
    let goal = fixtures().quest(TEAM_QUEST_ID);
    let prover = Arc::new(ScriptedProver::honest());
    let submitter = Arc::new(RecordingSubmitter::accepting(10));
    let store = NullifierStore::in_memory();
    let orchestrator = orchestrator(&prover, &submitter, &store);

    orchestrator.run(goal, fixtures().cards(), &NoProgress).await.unwrap();
    let err = orchestrator
        .run(goal, fixtures().cards(), &NoProgress)
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::AlreadySubmitted));
    assert_eq!(submitter.calls(), 1);
}

#[tokio::test]
async fn expired_goal_never_starts_proving() {
    let goal = fixtures().quest(EXPIRED_QUEST_ID);
    let prover = Arc::new(ScriptedProver::honest());
    let submitter = Arc::new(RecordingSubmitter::accepting(10));
    let store = NullifierStore::in_memory();

    let err = orchestrator(&prover, &submitter, &store)
        .run(goal, fixtures().cards(), &NoProgress)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::Expired);
    assert_eq!(prover.calls(), 0);
    assert_eq!(submitter.calls(), 0);
}

#[tokio::test]
async fn precondition_failures_are_reported_in_order() {
    let goal = fixtures().quest(TEAM_QUEST_ID);
    let prover = Arc::new(ScriptedProver::honest());
    let submitter = Arc::new(RecordingSubmitter::accepting(10));
    let store = NullifierStore::in_memory();
    let orchestrator = orchestrator(&prover, &submitter, &store);

    let err = orchestrator.run(goal, &[], &NoProgress).await.unwrap_err();
    assert!(matches!(err, SessionError::NoCards));

    let no_team = vec![CardRecord::new(3, "sig-frog-1")];
    let err = orchestrator.run(goal, &no_team, &NoProgress).await.unwrap_err();
    assert!(matches!(err, SessionError::MissingPrerequisite));
    assert!(err.is_precondition());
    assert_eq!(prover.calls(), 0);
}

#[tokio::test]
async fn rejected_submission_leaves_store_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nullifiers.json");
    let store = NullifierStore::json_file(&path).unwrap();
    store
        .merge(GoalKind::Quest, TEAM_QUEST_ID, ["sig-frog-1"])
        .unwrap();
    let before = std::fs::read(&path).unwrap();

    let goal = fixtures().quest(TEAM_QUEST_ID);
    let prover = Arc::new(ScriptedProver::honest());
    let submitter = Arc::new(RecordingSubmitter::rejecting(503, "leaderboard offline"));

    let err = orchestrator(&prover, &submitter, &store)
        .run(goal, fixtures().cards(), &NoProgress)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SessionError::Submission(SubmitError::Rejected { status: 503, .. })
    ));
    assert!(err.is_retryable());
    assert_eq!(std::fs::read(&path).unwrap(), before);

    // Retrying with a healthy leaderboard commits as usual.
    let healthy = Arc::new(RecordingSubmitter::accepting(5));
    let outcome = orchestrator(&prover, &healthy, &store)
        .run(goal, fixtures().cards(), &NoProgress)
        .await
        .unwrap();
    assert_eq!(outcome.newly_nullified, 2);
}

#[tokio::test]
async fn credited_score_is_reported_when_commit_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nullifiers.json");
    let store = NullifierStore::json_file(&path).unwrap();

    let goal = fixtures().quest(TEAM_QUEST_ID);
    let prover = Arc::new(ScriptedProver::honest());
    let submitter = Arc::new(RecordingSubmitter::accepting(30));

    // A directory squatting on the document path makes the final merge fail.
    let blocked = path.clone();
    let listener = move |state: &ProvingState| {
        if state.num_proofs_completed == 1 {
            std::fs::create_dir(&blocked).unwrap();
        }
    };

    let err = orchestrator(&prover, &submitter, &store)
        .run(goal, fixtures().cards(), &listener)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SessionError::NullifierCommit {
            score_delta: 30,
            source: StoreError::File { .. }
        }
    ));
    assert_eq!(err.kind(), FailureKind::NullifierCommit);
    assert_eq!(prover.calls(), 4);
    assert_eq!(submitter.calls(), 1);
}

#[tokio::test]
async fn unreadable_store_fails_validation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nullifiers.json");
    std::fs::write(&path, "{not json").unwrap();
    let store = NullifierStore::json_file(&path).unwrap();

    let goal = fixtures().quest(TEAM_QUEST_ID);
    let prover = Arc::new(ScriptedProver::honest());
    let submitter = Arc::new(RecordingSubmitter::accepting(10));

    let err = orchestrator(&prover, &submitter, &store)
        .run(goal, fixtures().cards(), &NoProgress)
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::Store(StoreError::Corrupt(_))));
    assert!(!err.is_precondition());
    assert_eq!(prover.calls(), 0);
    assert_eq!(submitter.calls(), 0);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{not json");
}

#[tokio::test]
async fn proof_failure_stops_the_sequence() {
    let goal = fixtures().quest(TEAM_QUEST_ID);
    let prover = Arc::new(ScriptedProver::honest().failing_at(2));
    let submitter = Arc::new(RecordingSubmitter::accepting(10));
    let store = NullifierStore::in_memory();
    let (seen, listener) = recorder();

    let err = orchestrator(&prover, &submitter, &store)
        .run(goal, fixtures().cards(), &listener)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SessionError::ProofGeneration { index: 2, total: 4, .. }
    ));
    assert_eq!(prover.calls(), 3);
    assert_eq!(seen.lock().unwrap().len(), 2);
    assert_eq!(submitter.calls(), 0);
    assert!(store.load().unwrap().is_empty());
}

#[tokio::test]
async fn proof_for_the_wrong_slot_is_rejected() {
    let goal = fixtures().quest(TEAM_QUEST_ID);
    let prover = Arc::new(ScriptedProver::honest().forging_at(1));
    let submitter = Arc::new(RecordingSubmitter::accepting(10));
    let store = NullifierStore::in_memory();

    let err = orchestrator(&prover, &submitter, &store)
        .run(goal, fixtures().cards(), &NoProgress)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::ProofGeneration);
    assert_eq!(submitter.calls(), 0);
    assert!(store.load().unwrap().is_empty());
}

#[tokio::test]
async fn cancellation_between_steps_skips_commit() {
    let goal = fixtures().quest(TEAM_QUEST_ID);
    let prover = Arc::new(ScriptedProver::honest());
    let submitter = Arc::new(RecordingSubmitter::accepting(10));
    let store = NullifierStore::in_memory();
    let token = CancellationToken::new();

    let trigger = token.clone();
    let listener = move |state: &ProvingState| {
        if state.num_proofs_completed == 1 {
            trigger.cancel();
        }
    };

    let err = orchestrator(&prover, &submitter, &store)
        .run_until_cancelled(goal, fixtures().cards(), &listener, &token)
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::Cancelled));
    assert_eq!(prover.calls(), 1);
    assert_eq!(submitter.calls(), 0);
    assert!(store.load().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_an_in_flight_proof() {
    let goal = fixtures().quest(TEAM_QUEST_ID);
    let prover = Arc::new(ScriptedProver::honest().with_delay(Duration::from_secs(5)));
    let submitter = Arc::new(RecordingSubmitter::accepting(10));
    let store = NullifierStore::in_memory();
    let token = CancellationToken::new();
    let orchestrator = orchestrator(&prover, &submitter, &store);

    let (result, ()) = tokio::join!(
        orchestrator.run_until_cancelled(goal, fixtures().cards(), &NoProgress, &token),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        }
    );

    assert!(matches!(result, Err(SessionError::Cancelled)));
    assert_eq!(prover.calls(), 1);
    assert!(prover.proved().is_empty());
    assert!(store.load().unwrap().is_empty());
}

#[tokio::test]
async fn progress_can_be_streamed_over_a_channel() {
    let goal = fixtures().quest(TEAM_QUEST_ID);
    let prover = Arc::new(ScriptedProver::honest());
    let submitter = Arc::new(RecordingSubmitter::accepting(10));
    let store = NullifierStore::in_memory();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    orchestrator(&prover, &submitter, &store)
        .run(goal, fixtures().cards(), &ChannelProgress(tx))
        .await
        .unwrap();

    let mut last = 0;
    while let Ok(state) = rx.try_recv() {
        assert_eq!(state.num_proofs_completed, last + 1);
        assert!(state.num_proofs_completed <= state.num_proofs_total);
        last = state.num_proofs_completed;
    }
    assert_eq!(last, 4);
}

#[tokio::test]
async fn sled_store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nullifiers.db");
    let goal = fixtures().quest(TEAM_QUEST_ID);

    {
        let store = NullifierStore::sled(&path).unwrap();
        let prover = Arc::new(ScriptedProver::honest());
        let submitter = Arc::new(RecordingSubmitter::accepting(10));
        orchestrator(&prover, &submitter, &store)
            .run(goal, fixtures().cards(), &NoProgress)
            .await
            .unwrap();
    }

    let reopened = NullifierStore::sled(&path).unwrap();
    assert_eq!(reopened.query(GoalKind::Quest, TEAM_QUEST_ID).unwrap().len(), 3);
}

#[tokio::test]
async fn plan_matches_the_session_that_would_run() {
    let goal = fixtures().quest(TEAM_QUEST_ID);
    let prover = Arc::new(ScriptedProver::honest());
    let submitter = Arc::new(RecordingSubmitter::accepting(10));
    let store = NullifierStore::in_memory();

    let plan = orchestrator(&prover, &submitter, &store)
        .plan(goal, fixtures().cards())
        .unwrap();
    assert_eq!(plan.total(), 4);
    assert_eq!(plan.prerequisite_records.len(), 1);
    assert_eq!(prover.calls(), 0);
}
