use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc::Receiver;

use workbench::config::RateLimitConfig;
use workbench::web::{Connection, FrameOutcome};
use workbench_sandbox::WorkspaceRootRegistry;
use workbench_terminal::testing::FakeBackend;
use workbench_terminal::{SessionEvent, SessionRegistry, TerminalConfig};

struct Fixture {
    _temp: TempDir,
    backend: FakeBackend,
    registry: SessionRegistry,
}

fn fixture_with(backend: FakeBackend) -> Fixture {
    let temp = TempDir::new().unwrap();
    let base = temp.path().canonicalize().unwrap();
    std::fs::create_dir_all(base.join("workspace/alpha")).unwrap();

    let config = TerminalConfig {
        shell: Some("bash".to_string()),
        ..TerminalConfig::default()
    };
    let registry = SessionRegistry::new(WorkspaceRootRegistry::new(&base), Arc::new(backend.clone()), config);
    Fixture {
        _temp: temp,
        backend,
        registry,
    }
}

fn fixture() -> Fixture {
    fixture_with(FakeBackend::new())
}

fn connect(f: &Fixture) -> (Connection, Receiver<SessionEvent>) {
    Connection::new(f.registry.clone(), RateLimitConfig::default())
}

async fn next_event(rx: &mut Receiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

fn input(session_id: &str, data: &str) -> String {
    serde_json::json!({ "type": "input", "sessionId": session_id, "data": data }).to_string()
}

/// Init a fresh session and return its id once `ready` has arrived
async fn init(conn: &mut Connection, rx: &mut Receiver<SessionEvent>, frame: &str) -> String {
    assert_eq!(conn.handle_text(frame).await, FrameOutcome::Continue);
    match next_event(rx).await {
        SessionEvent::Ready { session_id } => {
            assert_eq!(conn.attached(), Some(session_id.as_str()));
            session_id
        }
        other => panic!("expected ready, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_input_flood_is_capped_per_window() {
    let f = fixture();
    let (mut conn, mut rx) = connect(&f);
    let id = init(&mut conn, &mut rx, r#"{"type":"init"}"#).await;

    for _ in 0..150 {
        assert_eq!(conn.handle_text(&input(&id, "a")).await, FrameOutcome::Continue);
    }

    let shell = f.backend.last_shell().unwrap();
    assert_eq!(shell.read_input().await, "a".repeat(100));
}

#[tokio::test]
async fn test_typed_exit_closes_connection_but_keeps_session() {
    let f = fixture();
    let (mut conn, mut rx) = connect(&f);
    let id = init(&mut conn, &mut rx, r#"{"type":"init"}"#).await;

    for ch in ["e", "x", "i", "t"] {
        assert_eq!(conn.handle_text(&input(&id, ch)).await, FrameOutcome::Continue);
    }
    assert_eq!(conn.handle_text(&input(&id, "\r")).await, FrameOutcome::Close);
    conn.close().await;

    let shell = f.backend.last_shell().unwrap();
    assert_eq!(shell.read_input().await, "exit\r");
    assert!(shell.signals().is_empty());
    assert!(f.registry.contains(&id).await);
}

#[tokio::test]
async fn test_two_connections_share_one_session() {
    let f = fixture();
    let (mut a, mut rx_a) = connect(&f);
    let (mut b, mut rx_b) = connect(&f);

    let id = init(&mut a, &mut rx_a, r#"{"type":"init","workspaceId":"alpha"}"#).await;
    let frame = serde_json::json!({ "type": "init", "sessionId": id }).to_string();
    assert_eq!(init(&mut b, &mut rx_b, &frame).await, id);
    assert_eq!(f.backend.spawn_count(), 1);

    f.backend.last_shell().unwrap().emit("hello\r\n").await;

    let expected = SessionEvent::Output {
        session_id: id.clone(),
        data: "hello\r\n".to_string(),
    };
    assert_eq!(next_event(&mut rx_a).await, expected);
    assert_eq!(next_event(&mut rx_b).await, expected);
}

#[tokio::test]
async fn test_malformed_and_unattached_frames_are_dropped() {
    let f = fixture();
    let (mut conn, _rx) = connect(&f);

    assert_eq!(conn.handle_text("not json").await, FrameOutcome::Continue);
    assert_eq!(conn.handle_text(r#"{"type":"resize","cols":80}"#).await, FrameOutcome::Continue);
    assert_eq!(conn.handle_text(r#"{"type":"input"}"#).await, FrameOutcome::Continue);
    assert_eq!(conn.handle_text(&input("term-deadbeef", "ls\r")).await, FrameOutcome::Continue);

    assert_eq!(conn.attached(), None);
    assert_eq!(f.backend.spawn_count(), 0);
}

#[tokio::test]
async fn test_input_for_another_session_is_ignored() {
    let f = fixture();
    let (mut a, mut rx_a) = connect(&f);
    let (mut b, mut rx_b) = connect(&f);
    let id_a = init(&mut a, &mut rx_a, r#"{"type":"init"}"#).await;
    let _id_b = init(&mut b, &mut rx_b, r#"{"type":"init"}"#).await;

    assert_eq!(b.handle_text(&input(&id_a, "rm -rf x\r")).await, FrameOutcome::Continue);

    let shell_a = f.backend.shell(0).unwrap();
    assert_eq!(shell_a.read_input().await, "");
}

#[tokio::test]
async fn test_spawn_failure_is_reported_as_output() {
    let f = fixture_with(FakeBackend::failing());
    let (mut conn, mut rx) = connect(&f);

    assert_eq!(conn.handle_text(r#"{"type":"init"}"#).await, FrameOutcome::Continue);

    match next_event(&mut rx).await {
        SessionEvent::Output { data, .. } => {
            assert!(data.starts_with("\r\n\x1b[31mFailed to spawn shell:"), "{:?}", data);
            assert!(data.ends_with("\x1b[0m\r\n"));
        }
        other => panic!("expected output, got {:?}", other),
    }
    assert_eq!(conn.attached(), None);
    assert!(f.registry.is_empty().await);
}

#[tokio::test]
async fn test_repeated_init_is_ignored() {
    let f = fixture();
    let (mut conn, mut rx) = connect(&f);
    let id = init(&mut conn, &mut rx, r#"{"type":"init"}"#).await;

    assert_eq!(conn.handle_text(r#"{"type":"init"}"#).await, FrameOutcome::Continue);

    assert_eq!(conn.attached(), Some(id.as_str()));
    assert_eq!(f.backend.spawn_count(), 1);
    assert_eq!(f.registry.len().await, 1);
}

#[tokio::test]
async fn test_close_detaches_without_killing() {
    let f = fixture();
    let (mut conn, mut rx) = connect(&f);
    let id = init(&mut conn, &mut rx, r#"{"type":"init"}"#).await;

    conn.close().await;

    let sessions = f.registry.list().await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, id);
    assert_eq!(sessions[0].connections, 0);
    assert!(f.backend.last_shell().unwrap().signals().is_empty());
}

#[tokio::test]
async fn test_exit_frees_connection_for_new_init() {
    let f = fixture();
    let (mut conn, mut rx) = connect(&f);
    let first = init(&mut conn, &mut rx, r#"{"type":"init"}"#).await;

    f.backend.last_shell().unwrap().exit(Some(0)).await;
    let event = next_event(&mut rx).await;
    assert_eq!(
        event,
        SessionEvent::Exit {
            session_id: first.clone(),
            code: Some(0),
        }
    );
    conn.on_event_sent(&event);
    assert_eq!(conn.attached(), None);

    let second = init(&mut conn, &mut rx, r#"{"type":"init"}"#).await;
    assert_ne!(first, second);
    assert_eq!(f.backend.spawn_count(), 2);
}

#[tokio::test]
async fn test_stalled_connection_is_cut_loose_while_session_lives() {
    let f = fixture();
    let (mut stalled, mut stalled_rx) = connect(&f);
    let (mut live, mut live_rx) = connect(&f);

    let id = init(&mut stalled, &mut stalled_rx, r#"{"type":"init"}"#).await;
    let frame = serde_json::json!({ "type": "init", "sessionId": id }).to_string();
    init(&mut live, &mut live_rx, &frame).await;

    let lagged = stalled.lag_signal();
    let shell = f.backend.last_shell().unwrap();

    // The stalled receiver is never read; the live one drains as it goes
    tokio::time::timeout(Duration::from_secs(10), async {
        while !lagged.is_cancelled() {
            shell.emit("x\r\n").await;
            while live_rx.try_recv().is_ok() {}
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("stalled connection was never signalled");

    let sessions = f.registry.list().await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].connections, 1);

    shell.emit("still here\r\n").await;
    loop {
        match next_event(&mut live_rx).await {
            SessionEvent::Output { data, .. } if data.contains("still here") => break,
            _ => {}
        }
    }
    drop(stalled_rx);
}
