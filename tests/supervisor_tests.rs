//! Session lifecycle against a mock arena, across producer strategies.

mod common;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use arenalink::error::{ArenaError, ExitCode};
use arenalink::producer::{ProducerKind, StopOutcome};
use arenalink::session::{Cursor, RunHandle, SessionState, SessionStatus};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{
    init_call, mount_matchmaking, observation, supervisor, supervisor_with, test_config,
    FakeDaemonLauncher,
};

const RUN: &str = "run-1";
const OBSERVATIONS: &str = "/runs/run-1-internal/observations";

#[tokio::test]
async fn join_waits_for_init_and_initial_state_without_consuming() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_matchmaking(&server, RUN).await;
    Mock::given(method("GET"))
        .and(path(OBSERVATIONS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "observations": [
                init_call(RUN),
                observation(json!({"event": "initial_state", "health": 20, "score": 0}))
            ],
            "nextPageToken": "p1"
        })))
        .mount(&server)
        .await;

    let supervisor = supervisor(test_config(dir.path(), &server, ProducerKind::RemotePoll));
    let outcome = supervisor.join(Duration::from_secs(5)).await.unwrap();

    assert_eq!(outcome.producer, ProducerKind::RemotePoll);
    assert_eq!(outcome.producer_pid, None);
    assert_eq!(outcome.run.run_id, RUN);
    assert_eq!(outcome.run.internal_run_id.as_deref(), Some("run-1-internal"));
    assert_eq!(outcome.run.participant_id.as_deref(), Some("participant-1"));
    assert_eq!(outcome.run.task.as_deref(), Some("Collect 5 diamonds"));
    assert_eq!(
        outcome.run.skills,
        vec!["skills.goToPosition".to_string(), "skills.mine".to_string()]
    );
    assert_eq!(outcome.summary()["health"], json!(20));

    let state = supervisor.store().load(&outcome.session_id).unwrap();
    assert_eq!(state.status, SessionStatus::Playing);
    assert_eq!(state.cursor, Cursor::Token { token: None });

    // Join only peeked, so the first read still sees the opening state.
    let digest = supervisor.observe(&outcome.session_id, false).await.unwrap();
    assert_eq!(digest.total_events, 1);
    assert_eq!(digest.current_state["health"], json!(20));
    let state = supervisor.store().load(&outcome.session_id).unwrap();
    assert_eq!(state.cursor, Cursor::Token { token: Some("p1".into()) });
}

#[tokio::test]
async fn poll_reads_advance_only_when_not_peeking() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_matchmaking(&server, RUN).await;
    Mock::given(method("GET"))
        .and(path(OBSERVATIONS))
        .and(query_param("pageToken", "p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "observations": [
                observation(json!({"event": "chat", "messages": ["hi"], "score": 1})),
                observation(json!({"event": "gameover", "score": 5}))
            ],
            "nextPageToken": "p2"
        })))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(OBSERVATIONS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "observations": [
                init_call(RUN),
                observation(json!({"event": "initial_state", "score": 0}))
            ],
            "nextPageToken": "p1"
        })))
        .mount(&server)
        .await;

    let supervisor = supervisor(test_config(dir.path(), &server, ProducerKind::RemotePoll));
    let session_id = supervisor.join(Duration::from_secs(5)).await.unwrap().session_id;

    let first = supervisor.observe(&session_id, true).await.unwrap();
    let again = supervisor.observe(&session_id, true).await.unwrap();
    assert_eq!(first, again);
    assert_eq!(first.total_events, 1);

    supervisor.observe(&session_id, false).await.unwrap();
    let rest = supervisor.observe(&session_id, false).await.unwrap();
    assert_eq!(rest.total_events, 2);
    assert_eq!(rest.current_state["score"], json!(5));

    let state = supervisor.store().load(&session_id).unwrap();
    assert_eq!(state.status, SessionStatus::Finished);
    assert_eq!(state.cursor, Cursor::Token { token: Some("p2".into()) });
}

#[tokio::test]
async fn missing_initial_state_times_out_with_a_playable_session() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_matchmaking(&server, RUN).await;
    Mock::given(method("GET"))
        .and(path(OBSERVATIONS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "observations": [init_call(RUN)]
        })))
        .mount(&server)
        .await;

    let supervisor = supervisor(test_config(dir.path(), &server, ProducerKind::RemotePoll));
    let err = supervisor.join(Duration::from_millis(300)).await.unwrap_err();

    match &err {
        ArenaError::InitTimeout { stage, .. } => assert_eq!(stage, "initial_state"),
        other => panic!("expected InitTimeout, got {other:?}"),
    }
    assert_eq!(err.exit_code(), ExitCode::GameTimeout);

    let sessions = supervisor.list().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].status, Some(SessionStatus::Playing));
    let state = supervisor.store().load(&sessions[0].session_id).unwrap();
    assert_eq!(
        state.run.unwrap().participant_id.as_deref(),
        Some("participant-1")
    );
}

#[tokio::test]
async fn rejected_queue_join_fails_the_session() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    Mock::given(method("POST"))
        .and(path("/queue/join"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "error": "agent is already queued"
        })))
        .mount(&server)
        .await;

    let supervisor = supervisor(test_config(dir.path(), &server, ProducerKind::RemotePoll));
    let err = supervisor.join(Duration::from_secs(5)).await.unwrap_err();

    assert!(matches!(&err, ArenaError::QueueRejected(reason) if reason == "agent is already queued"));
    assert_eq!(err.exit_code(), ExitCode::Failure);
    assert_eq!(
        supervisor.list().unwrap()[0].status,
        Some(SessionStatus::Failed)
    );
}

#[tokio::test]
async fn bad_api_key_is_a_configuration_error() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    Mock::given(method("POST"))
        .and(path("/queue/join"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
        .mount(&server)
        .await;

    let supervisor = supervisor(test_config(dir.path(), &server, ProducerKind::RemotePoll));
    let err = supervisor.join(Duration::from_secs(5)).await.unwrap_err();
    assert!(matches!(err, ArenaError::Configuration(_)));
}

#[tokio::test]
async fn observing_an_unknown_session_is_an_error() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let supervisor = supervisor(test_config(dir.path(), &server, ProducerKind::RemotePoll));

    let err = supervisor.observe("deadbeef", false).await.unwrap_err();
    assert!(matches!(err, ArenaError::SessionNotFound(_)));
    assert_eq!(err.exit_code().as_i32(), 1);
}

#[tokio::test]
async fn stopping_a_session_without_a_producer_changes_nothing() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let supervisor = supervisor(test_config(dir.path(), &server, ProducerKind::LocalDaemon));
    let state = SessionState::new("cafe0001", common::AGENT, ProducerKind::LocalDaemon);
    supervisor.store().create(&state).unwrap();

    assert_eq!(supervisor.stop("cafe0001").await.unwrap(), StopOutcome::NotRunning);
    assert_eq!(supervisor.store().load("cafe0001").unwrap(), state);
}

fn sse_data(record: serde_json::Value) -> String {
    format!("data: {record}\n")
}

#[tokio::test]
async fn stream_reads_consume_complete_lines_by_offset() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let supervisor = supervisor(test_config(dir.path(), &server, ProducerKind::RemoteStream));
    let mut state = SessionState::new("feed0001", common::AGENT, ProducerKind::RemoteStream);
    state.run = Some(RunHandle::new(RUN));
    let paths = supervisor.store().create(&state).unwrap();

    let complete = [
        sse_data(init_call(RUN)),
        ": keep-alive\n".to_string(),
        sse_data(observation(json!({"event": "initial_state", "health": 20, "score": 0}))),
        sse_data(observation(json!({"event": "chat", "messages": ["hi"], "score": 1}))),
    ]
    .concat();
    let partial = "data: {\"level\":\"observation\",\"data\":{\"event\":\"game";
    std::fs::write(&paths.stream_buffer, format!("{complete}{partial}")).unwrap();

    let peeked = supervisor.observe("feed0001", true).await.unwrap();
    assert_eq!(peeked.total_events, 2);
    let stored = supervisor.store().load("feed0001").unwrap();
    assert_eq!(stored.cursor, Cursor::Offset { offset: 0 });
    assert_eq!(stored.run.as_ref().unwrap().task, None);

    let read = supervisor.observe("feed0001", false).await.unwrap();
    assert_eq!(read.total_events, 2);
    assert_eq!(read.current_state["score"], json!(1));
    let stored = supervisor.store().load("feed0001").unwrap();
    assert_eq!(
        stored.cursor,
        Cursor::Offset {
            offset: complete.len() as u64
        }
    );
    assert_eq!(
        stored.run.as_ref().unwrap().task.as_deref(),
        Some("Collect 5 diamonds")
    );
    assert_eq!(stored.status, SessionStatus::WaitingForInit);

    let mut buffer = std::fs::OpenOptions::new()
        .append(true)
        .open(&paths.stream_buffer)
        .unwrap();
    buffer.write_all(b"over\",\"score\":5}}\n").unwrap();

    let rest = supervisor.observe("feed0001", false).await.unwrap();
    assert_eq!(rest.total_events, 1);
    assert_eq!(rest.current_state["score"], json!(5));
    let stored = supervisor.store().load("feed0001").unwrap();
    assert_eq!(stored.status, SessionStatus::Finished);
    assert_eq!(supervisor.observe("feed0001", false).await.unwrap().total_events, 0);
}

#[tokio::test]
async fn daemon_join_keeps_the_init_it_wrote_and_drains_the_journal() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_matchmaking(&server, RUN).await;
    let launcher = Arc::new(FakeDaemonLauncher::new(RUN, true));
    let supervisor = supervisor_with(
        test_config(dir.path(), &server, ProducerKind::LocalDaemon),
        launcher.clone(),
    );

    let outcome = supervisor.join(Duration::from_secs(5)).await.unwrap();

    assert_eq!(outcome.producer, ProducerKind::LocalDaemon);
    assert!(outcome.producer_pid.is_some());
    assert_eq!(outcome.run.task.as_deref(), Some("Collect 5 diamonds"));
    assert_eq!(outcome.run.participant_id.as_deref(), Some("participant-1"));
    assert_eq!(outcome.run.internal_run_id.as_deref(), Some("run-1-internal"));
    assert_eq!(outcome.summary()["health"], json!(20));

    let state = supervisor.store().load(&outcome.session_id).unwrap();
    assert_eq!(state.status, SessionStatus::Playing);
    assert_eq!(state.run.as_ref(), Some(&outcome.run));

    let digest = supervisor.observe(&outcome.session_id, false).await.unwrap();
    assert_eq!(digest.total_events, 1);
    assert_eq!(supervisor.observe(&outcome.session_id, false).await.unwrap().total_events, 0);

    let stopped = supervisor.stop(&outcome.session_id).await.unwrap();
    assert!(matches!(
        stopped,
        StopOutcome::Stopped { .. } | StopOutcome::Killed { .. }
    ));
    launcher.reap();
}

#[tokio::test]
async fn daemon_that_never_registers_is_not_treated_as_ready() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let launcher = Arc::new(FakeDaemonLauncher::new(RUN, false));
    let supervisor = supervisor_with(
        test_config(dir.path(), &server, ProducerKind::LocalDaemon),
        launcher.clone(),
    );

    let err = supervisor.join(Duration::from_millis(300)).await.unwrap_err();
    launcher.reap();

    assert!(matches!(err, ArenaError::Producer(_)));
    let sessions = supervisor.list().unwrap();
    assert_eq!(sessions[0].status, Some(SessionStatus::Failed));
    assert!(server.received_requests().await.unwrap().is_empty());
}
