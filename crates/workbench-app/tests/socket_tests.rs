mod common;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use common::{TestServer, TOKEN};
use workbench::{AuthError, AuthStore};
use workbench_terminal::testing::FakeBackend;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct BrokenStore;

#[async_trait]
impl AuthStore for BrokenStore {
    async fn is_valid_session(&self, _token: &str) -> Result<bool, AuthError> {
        Err(AuthError::Store(std::io::Error::new(
            std::io::ErrorKind::Other,
            "token database is locked",
        )))
    }
}

/// Serve the full router on an ephemeral port
async fn serve(server: &TestServer) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = server.server.router();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn open(addr: SocketAddr, query: &str) -> Client {
    let url = format!("ws://{}/api/term/ws{}", addr, query);
    let (client, _response) = connect_async(url).await.unwrap();
    client
}

async fn next_message(client: &mut Client) -> Message {
    tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .expect("timed out waiting for a message")
        .expect("socket ended without a message")
        .unwrap()
}

/// Send an init frame up front, then expect a close with the given status
async fn assert_refused(addr: SocketAddr, query: &str, code: u16, reason: &str, backend: &FakeBackend) {
    let mut client = open(addr, query).await;
    let _ = client
        .send(Message::Text(r#"{"type":"init"}"#.to_string()))
        .await;

    match next_message(&mut client).await {
        Message::Close(Some(frame)) => {
            assert_eq!(u16::from(frame.code), code);
            assert_eq!(frame.reason, reason);
        }
        other => panic!("expected close frame, got {:?}", other),
    }
    assert_eq!(backend.spawn_count(), 0);
}

#[tokio::test]
async fn test_missing_and_invalid_tokens_close_with_policy_status() {
    let server = TestServer::new();
    let addr = serve(&server).await;

    assert_refused(addr, "", 1008, "Unauthorized: Missing token", &server.backend).await;
    assert_refused(addr, "?token=", 1008, "Unauthorized: Missing token", &server.backend).await;
    assert_refused(addr, "?token=nope", 1008, "Unauthorized: Invalid token", &server.backend).await;
}

#[tokio::test]
async fn test_store_failure_closes_with_internal_error_status() {
    let server = TestServer::with_auth(Arc::new(BrokenStore));
    let addr = serve(&server).await;

    assert_refused(addr, &format!("?token={}", TOKEN), 1011, "Internal Server Error", &server.backend).await;
}

#[tokio::test]
async fn test_valid_token_gets_ready_then_output() {
    let server = TestServer::new();
    let addr = serve(&server).await;

    let mut client = open(addr, &format!("?token={}", TOKEN)).await;
    client
        .send(Message::Text(r#"{"type":"init","workspaceId":"alpha"}"#.to_string()))
        .await
        .unwrap();

    let ready = match next_message(&mut client).await {
        Message::Text(text) => serde_json::from_str::<serde_json::Value>(&text).unwrap(),
        other => panic!("expected ready, got {:?}", other),
    };
    assert_eq!(ready["type"], "ready");
    let session_id = ready["sessionId"].as_str().unwrap().to_string();
    assert_eq!(server.backend.spawn_count(), 1);

    server.backend.last_shell().unwrap().emit("$ ").await;
    match next_message(&mut client).await {
        Message::Text(text) => {
            let frame: serde_json::Value = serde_json::from_str(&text).unwrap();
            assert_eq!(frame["type"], "output");
            assert_eq!(frame["sessionId"], session_id.as_str());
            assert_eq!(frame["data"], "$ ");
        }
        other => panic!("expected output, got {:?}", other),
    }

    client.close(None).await.unwrap();
}
