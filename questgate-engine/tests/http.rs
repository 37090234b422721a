#![cfg(feature = "http")]

use axum::extract::{Json, Path};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use questgate_common::{GoalKind, ProofBundle, RawGoal};
use questgate_engine::{
    DigestProver, GoalSource, HttpGoalCatalog, HttpScoreSubmitter, NoProgress, NullifierStore,
    ProofOrchestrator, ScoreSubmitter, SessionError, SubmitError,
};
use questgate_test_fixtures::{fixture_clock, fixtures, TEAM_QUEST_ID};
use serde_json::{json, Value};

async fn list_quests() -> Json<Vec<RawGoal>> {
    Json(fixtures().quests().iter().cloned().map(RawGoal::from).collect())
}

async fn quest_by_id(Path(id): Path<u64>) -> Result<Json<RawGoal>, StatusCode> {
    fixtures()
        .quests()
        .iter()
        .find(|quest| quest.id == id)
        .cloned()
        .map(|quest| Json(RawGoal::from(quest)))
        .ok_or(StatusCode::NOT_FOUND)
}

async fn leaderboard(
    Path(id): Path<u64>,
    Json(bundle): Json<ProofBundle>,
) -> (StatusCode, Json<Value>) {
    if bundle.goal_id != id {
        return (StatusCode::BAD_REQUEST, Json(json!({ "message": "goal mismatch" })));
    }
    let score = bundle.collection_proofs().len() as u64 * 10;
    (StatusCode::OK, Json(json!({ "scoreAdded": score })))
}

async fn broken() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn spawn_server() -> String {
    let app = Router::new()
        .route("/api/quests", get(list_quests))
        .route("/api/quests/:id", get(quest_by_id))
        .route("/api/quests/:id/leaderboard", post(leaderboard))
        .route("/api/powers", get(broken))
        .route("/api/powers/:id/leaderboard", post(broken));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn catalog_reads_goals_and_swallows_failures() {
    let base = spawn_server().await;
    let catalog = HttpGoalCatalog::new(&base).unwrap();

    let quests = catalog.fetch_goal_list(GoalKind::Quest).await;
    assert_eq!(quests.len(), fixtures().quests().len());

    let quest = catalog.fetch_goal(GoalKind::Quest, TEAM_QUEST_ID).await.unwrap();
    assert!(quest.is_team_leaderboard());

    assert!(catalog.fetch_goal(GoalKind::Quest, 404).await.is_none());
    assert!(catalog.fetch_goal_list(GoalKind::Power).await.is_empty());
}

#[tokio::test]
async fn session_submits_over_http() {
    let base = spawn_server().await;
    let catalog = HttpGoalCatalog::new(&base).unwrap();
    let goal = catalog.fetch_goal(GoalKind::Quest, TEAM_QUEST_ID).await.unwrap();

    let store = NullifierStore::in_memory();
    let orchestrator = ProofOrchestrator::new(
        DigestProver,
        HttpScoreSubmitter::new(&base).unwrap(),
        store.clone(),
    )
    .with_clock(fixture_clock());

    let outcome = orchestrator
        .run(&goal, fixtures().cards(), &NoProgress)
        .await
        .unwrap();
    assert_eq!(outcome.score_delta, 30);
    assert_eq!(store.query(GoalKind::Quest, TEAM_QUEST_ID).unwrap().len(), 3);
}

#[tokio::test]
async fn server_errors_surface_as_rejections() {
    let base = spawn_server().await;
    let submitter = HttpScoreSubmitter::new(&base).unwrap();
    let bundle = ProofBundle {
        goal_kind: GoalKind::Power,
        goal_id: 10,
        prerequisite_count: 0,
        proofs: vec![],
    };

    let err = submitter.submit(&bundle, 10).await.unwrap_err();
    assert!(matches!(err, SubmitError::Rejected { status: 500, .. }));
    assert!(SessionError::from(err).is_retryable());
}
