use axum::body::Body;
use axum::http::{Request, StatusCode};
use buzzer::broadcast::{outbox, Outbound, OutboxReceiver};
use buzzer::config::ServerConfig;
use buzzer::protocol::{GameSnapshot, ServerMessage};
use buzzer::state::AppState;
use buzzer::types::{ConnectionId, SessionContext};
use buzzer::ws::handlers::handle_frame;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tower::ServiceExt;

const SECRET: &str = "s3cret";

struct Client {
    ctx: SessionContext,
    rx: OutboxReceiver,
}

impl Client {
    async fn join(state: &Arc<AppState>, raw: &str) -> Self {
        let (tx, rx) = outbox();
        let id = state.register(tx).await.expect("Should register");
        let identity = state
            .authenticate(id, raw)
            .await
            .expect("Should authenticate");
        Self {
            ctx: SessionContext::new(id, identity),
            rx,
        }
    }

    fn id(&self) -> ConnectionId {
        self.ctx.id
    }

    async fn send(&self, state: &Arc<AppState>, frame: &str) -> Option<ServerMessage> {
        handle_frame(state, &self.ctx, frame).await
    }

    /// Everything queued for this client so far, as text frames
    fn drain(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(item) = self.rx.try_recv() {
            if let Outbound::Text(text) = item {
                frames.push(text);
            }
        }
        frames
    }

    fn last_snapshot(&mut self) -> Option<GameSnapshot> {
        self.drain()
            .iter()
            .filter_map(|text| serde_json::from_str::<serde_json::Value>(text).ok())
            .filter(|value| value["type"] == "state")
            .filter_map(|value| serde_json::from_value(value).ok())
            .last()
    }
}

fn app() -> Arc<AppState> {
    Arc::new(AppState::new(ServerConfig::with_host_secret(SECRET)))
}

fn host_identity() -> String {
    format!("host:{}", SECRET)
}

/// Two players buzz in order and the host awards the first
#[tokio::test]
async fn test_buzz_round_with_winner() {
    let state = app();
    let mut host = Client::join(&state, &host_identity()).await;
    let a = Client::join(&state, "A").await;
    let b = Client::join(&state, "B").await;

    assert_eq!(host.send(&state, "UNLOCK").await, None);
    assert_eq!(a.send(&state, "BUZZ").await, None);
    assert_eq!(b.send(&state, "BUZZ").await, None);

    let snapshot = host.last_snapshot().expect("Host should see the queue");
    assert_eq!(snapshot.queue, vec!["A", "B"]);
    assert!(snapshot.buzz_lock);
    assert_eq!(snapshot.players, vec!["A", "B"]);
    assert_eq!(snapshot.winner, None);

    assert_eq!(host.send(&state, "WIN").await, None);

    let snapshot = host.last_snapshot().expect("Host should see the win");
    assert!(snapshot.queue.is_empty());
    assert!(!snapshot.buzz_lock);
    assert_eq!(snapshot.winner.as_deref(), Some("A"));

    // A second WIN with an empty queue broadcasts nothing
    assert_eq!(host.send(&state, "WIN").await, None);
    assert!(host.drain().is_empty());
}

#[tokio::test]
async fn test_duplicate_buzz_is_denied() {
    let state = app();
    let host = Client::join(&state, &host_identity()).await;
    let a = Client::join(&state, "A").await;

    host.send(&state, "UNLOCK").await;
    assert_eq!(a.send(&state, "BUZZ").await, None);
    assert_eq!(a.send(&state, "BUZZ").await, Some(ServerMessage::Penalty));

    let queue: Vec<String> = state.lock().await.game.queue().cloned().collect();
    assert_eq!(queue, vec!["A"]);
}

/// Buzzes while locked are denied, and the buzz window denies the fourth
/// even once buzzing opens
#[tokio::test]
async fn test_locked_buzzes_then_rate_limited() {
    let state = app();
    let host = Client::join(&state, &host_identity()).await;
    let c = Client::join(&state, "C").await;

    host.send(&state, "LOCK").await;
    for _ in 0..3 {
        assert_eq!(c.send(&state, "BUZZ").await, Some(ServerMessage::Penalty));
    }

    host.send(&state, "UNLOCK").await;
    assert_eq!(c.send(&state, "BUZZ").await, Some(ServerMessage::Penalty));
    assert_eq!(state.lock().await.game.queue().count(), 0);
}

#[tokio::test]
async fn test_boot_moves_to_next_player() {
    let state = app();
    let mut host = Client::join(&state, &host_identity()).await;
    let a = Client::join(&state, "A").await;
    let b = Client::join(&state, "B").await;

    host.send(&state, "UNLOCK").await;
    a.send(&state, "BUZZ").await;
    b.send(&state, "BUZZ").await;
    host.send(&state, "BOOT").await;

    let snapshot = host.last_snapshot().unwrap();
    assert_eq!(snapshot.queue, vec!["B"]);
    assert!(snapshot.buzz_lock);
}

#[tokio::test]
async fn test_reset_game_restores_defaults() {
    let state = app();
    let mut host = Client::join(&state, &host_identity()).await;
    let mut a = Client::join(&state, "A").await;

    host.send(&state, "UNLOCK").await;
    a.send(&state, "BUZZ").await;
    host.send(&state, "SCORE_UPDATE:A:300").await;
    host.send(&state, "DRAWING_MODE:ON").await;
    host.send(&state, "TOGGLE_SCOREBOARD:ON").await;
    host.drain();
    a.drain();

    host.send(&state, "RESET_GAME").await;

    let frames = a.drain();
    assert_eq!(frames[0], "RESET_GAME");
    let snapshot: GameSnapshot = serde_json::from_str(&frames[1]).unwrap();
    assert!(snapshot.queue.is_empty());
    assert!(!snapshot.buzz_lock);
    assert_eq!(snapshot.scores.unwrap()["A"], 0);

    let shared = state.lock().await;
    assert!(!shared.game.drawing_mode());
    assert!(shared.game.currently_drawing().is_empty());
}

#[tokio::test]
async fn test_score_update_for_unknown_player() {
    let state = app();
    let mut host = Client::join(&state, &host_identity()).await;
    let _a = Client::join(&state, "A").await;
    host.drain();

    let reply = host.send(&state, "SCORE_UPDATE:Nobody:100").await;
    match reply {
        Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "UNKNOWN_PLAYER"),
        other => panic!("Expected error, got {:?}", other),
    }
    assert!(host.drain().is_empty());
    assert_eq!(state.lock().await.game.score("Nobody"), None);
}

#[tokio::test]
async fn test_scores_only_visible_with_scoreboard() {
    let state = app();
    let mut host = Client::join(&state, &host_identity()).await;
    let _a = Client::join(&state, "A").await;

    host.send(&state, "SCORE_UPDATE:A:-200").await;
    assert_eq!(host.last_snapshot().unwrap().scores, None);

    host.send(&state, "TOGGLE_SCOREBOARD:ON").await;
    let scores = host.last_snapshot().unwrap().scores.unwrap();
    assert_eq!(scores["A"], -200);
}

#[tokio::test]
async fn test_player_cannot_lock() {
    let state = app();
    let host = Client::join(&state, &host_identity()).await;
    let a = Client::join(&state, "A").await;
    host.send(&state, "UNLOCK").await;

    match a.send(&state, "LOCK").await {
        Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "UNAUTHORIZED"),
        other => panic!("Expected error, got {:?}", other),
    }
    assert!(state.lock().await.game.is_buzz_open());
}

#[tokio::test]
async fn test_final_answer_goes_to_host_only() {
    let state = app();
    let mut host = Client::join(&state, &host_identity()).await;
    let a = Client::join(&state, "A").await;
    let mut b = Client::join(&state, "B").await;
    host.drain();
    b.drain();

    host.send(&state, "FINAL").await;
    assert_eq!(b.drain(), vec!["FINAL"]);
    assert!(host.drain().is_empty());

    assert_eq!(a.send(&state, "FINAL_ANSWER:A:What is  Rust?").await, None);
    assert_eq!(host.drain(), vec!["FINAL_ANSWER:A:What is Rust?"]);
    assert!(b.drain().is_empty());

    assert_eq!(a.send(&state, "WAGER:A:1000").await, None);
    assert_eq!(host.drain(), vec!["WAGER:A:1000"]);
}

#[tokio::test]
async fn test_final_answer_for_someone_else() {
    let state = app();
    let mut host = Client::join(&state, &host_identity()).await;
    let a = Client::join(&state, "A").await;
    let _b = Client::join(&state, "B").await;
    host.drain();

    match a.send(&state, "FINAL_ANSWER:B:forged").await {
        Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "AUTH_MISMATCH"),
        other => panic!("Expected error, got {:?}", other),
    }
    assert!(host.drain().is_empty());
}

#[tokio::test]
async fn test_overlong_final_answer_is_not_relayed() {
    let state = app();
    let mut host = Client::join(&state, &host_identity()).await;
    let a = Client::join(&state, "A").await;
    host.drain();

    let frame = format!("FINAL_ANSWER:A:{}", "x".repeat(501));
    match a.send(&state, &frame).await {
        Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "VALIDATION_ERROR"),
        other => panic!("Expected error, got {:?}", other),
    }
    assert!(host.drain().is_empty());

    let answer = "x".repeat(500);
    let frame = format!("FINAL_ANSWER:A:{}", answer);
    assert_eq!(a.send(&state, &frame).await, None);
    assert_eq!(host.drain(), vec![frame]);
}

#[tokio::test]
async fn test_overlong_wager_is_not_relayed() {
    let state = app();
    let mut host = Client::join(&state, &host_identity()).await;
    let a = Client::join(&state, "A").await;
    host.drain();

    let frame = format!("WAGER:A:{}", "9".repeat(51));
    match a.send(&state, &frame).await {
        Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "VALIDATION_ERROR"),
        other => panic!("Expected error, got {:?}", other),
    }
    assert!(host.drain().is_empty());
}

/// A host that stops reading is dropped once its outbox fills; players carry on
#[tokio::test]
async fn test_host_that_stops_reading_is_dropped() {
    let state = app();
    let host = Client::join(&state, &host_identity()).await;
    let a = Client::join(&state, "A").await;
    host.send(&state, "DRAWING_MODE:ON").await;

    let payload = r#"{"username":"A","timestamp":1,"imageData":"x"}"#;
    let frame = format!("DRAWING_SUBMIT:{}", payload);
    for _ in 0..70 {
        assert_eq!(a.send(&state, &frame).await, None);
    }

    let shared = state.lock().await;
    assert_eq!(shared.sessions.host(), None);
    assert!(shared.sessions.get(host.id()).is_none());
    assert!(shared.sessions.get(a.id()).is_some());
}

#[tokio::test]
async fn test_drawing_relay() {
    let state = app();
    let mut host = Client::join(&state, &host_identity()).await;
    let mut a = Client::join(&state, "A").await;
    let mut b = Client::join(&state, "B").await;

    let payload = r#"{"username":"A","timestamp":1700000000,"imageData":"data:image/png;base64,AAAA"}"#;
    let frame = format!("DRAWING_SUBMIT:{}", payload);

    // Rejected while drawing mode is off
    match a.send(&state, &frame).await {
        Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "DRAWING_MODE_OFF"),
        other => panic!("Expected error, got {:?}", other),
    }

    host.send(&state, "DRAWING_MODE:ON").await;
    host.drain();
    a.drain();
    b.drain();

    assert_eq!(a.send(&state, &frame).await, None);
    assert_eq!(host.drain(), vec![frame.clone()]);
    assert_eq!(b.drain(), vec![frame.clone()]);
    assert!(a.drain().is_empty());
    assert!(state.lock().await.game.currently_drawing().contains("A"));

    host.send(&state, "DRAWING_MODE:OFF").await;
    assert_eq!(b.drain(), vec!["DRAWING_MODE:OFF"]);
    assert!(state.lock().await.game.currently_drawing().is_empty());
}

#[tokio::test]
async fn test_drawing_with_wrong_username() {
    let state = app();
    let host = Client::join(&state, &host_identity()).await;
    let a = Client::join(&state, "A").await;
    host.send(&state, "DRAWING_MODE:ON").await;

    let frame = r#"DRAWING_SUBMIT:{"username":"B","timestamp":1,"imageData":"x"}"#;
    match a.send(&state, frame).await {
        Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "AUTH_MISMATCH"),
        other => panic!("Expected error, got {:?}", other),
    }

    let frame = r#"DRAWING_SUBMIT:{"username":"A"}"#;
    match a.send(&state, frame).await {
        Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "MALFORMED"),
        other => panic!("Expected error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_wrong_host_secret_leaves_no_trace() {
    let state = app();
    let (tx, _rx) = outbox();
    let id = state.register(tx).await.unwrap();

    let err = state.authenticate(id, "host:wrongsecret").await.unwrap_err();
    assert_eq!(err.code(), "AUTH_FAILED");
    assert_eq!(err.close_code(), 1008);

    state.disconnect(id).await;
    let shared = state.lock().await;
    assert_eq!(shared.sessions.host(), None);
    assert!(shared.sessions.is_empty());
}

#[tokio::test]
async fn test_duplicate_name_is_rejected() {
    let state = app();
    let _a = Client::join(&state, "A").await;

    let (tx, _rx) = outbox();
    let id = state.register(tx).await.unwrap();
    let err = state.authenticate(id, "A").await.unwrap_err();
    assert_eq!(err.code(), "NAME_TAKEN");
}

#[tokio::test]
async fn test_capacity_limit() {
    let mut config = ServerConfig::with_host_secret(SECRET);
    config.max_connections = 2;
    let state = Arc::new(AppState::new(config));

    let _a = Client::join(&state, "A").await;
    let _b = Client::join(&state, "B").await;

    let (tx, _rx) = outbox();
    let err = state.register(tx).await.unwrap_err();
    assert_eq!(err.code(), "SERVER_FULL");
    assert_eq!(err.close_code(), 1013);
}

/// A silent player is evicted, leaves the queue and disappears from snapshots
#[tokio::test(start_paused = true)]
async fn test_idle_player_is_evicted() {
    let state = app();
    let mut host = Client::join(&state, &host_identity()).await;
    let a = Client::join(&state, "A").await;
    let mut b = Client::join(&state, "B").await;

    host.send(&state, "UNLOCK").await;
    a.send(&state, "BUZZ").await;
    b.send(&state, "BUZZ").await;
    host.drain();
    b.drain();

    tokio::time::advance(Duration::from_secs(60)).await;
    assert!(state.evict_stale(Instant::now()).await.is_empty());

    // Everyone but A shows signs of life
    state.touch(host.id()).await;
    state.touch(b.id()).await;
    tokio::time::advance(Duration::from_secs(31)).await;

    let evicted = state.evict_stale(Instant::now()).await;
    assert_eq!(evicted, vec![a.id()]);

    let snapshot = host.last_snapshot().unwrap();
    assert_eq!(snapshot.queue, vec!["B"]);
    assert_eq!(snapshot.players, vec!["B"]);
    assert_eq!(state.lock().await.game.score("A"), Some(0));
}

/// One dead connection does not stop delivery to the others and is cleaned up
#[tokio::test]
async fn test_broken_connection_is_cleaned_up_during_broadcast() {
    let state = app();
    let mut host = Client::join(&state, &host_identity()).await;
    let dead = Client::join(&state, "Dead").await;
    let mut alive = Client::join(&state, "Alive").await;
    let dead_id = dead.id();
    drop(dead);
    host.drain();
    alive.drain();

    host.send(&state, "UNLOCK").await;

    assert!(state.lock().await.sessions.get(dead_id).is_none());
    let snapshot = alive.last_snapshot().unwrap();
    assert_eq!(snapshot.players, vec!["Alive"]);
    assert!(snapshot.buzz_lock);

    // Cleanup already happened; another attempt is a no-op
    assert!(!state.disconnect(dead_id).await);
}

#[tokio::test]
async fn test_new_host_replaces_old() {
    let state = app();
    let mut old = Client::join(&state, &host_identity()).await;
    let mut new = Client::join(&state, &host_identity()).await;
    let a = Client::join(&state, "A").await;
    old.drain();
    new.drain();

    assert_eq!(state.lock().await.sessions.host(), Some(new.id()));

    a.send(&state, "WAGER:A:10").await;
    assert_eq!(new.drain(), vec!["WAGER:A:10"]);
    assert!(old.drain().is_empty());
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = buzzer::router(app());

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"ok");
}

#[tokio::test]
async fn test_state_endpoint() {
    let state = app();
    let _old_host = Client::join(&state, &host_identity()).await;
    let a = Client::join(&state, "A").await;
    let host = Client::join(&state, &host_identity()).await;
    host.send(&state, "UNLOCK").await;
    a.send(&state, "BUZZ").await;

    let response = buzzer::router(state.clone())
        .oneshot(Request::get("/api/state").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json["queue"], serde_json::json!(["A"]));
    assert_eq!(json["buzz_lock"], true);
    assert_eq!(json["players"], serde_json::json!(["A"]));
    assert_eq!(json["host_connected"], true);
    assert_eq!(json["connections"].as_array().unwrap().len(), 3);
    assert!(json.get("scores").is_none());
}
