//! End-to-end gateway tests over a real WebSocket connection.
//!
//! Each test binds the router on an ephemeral port and drives it with a
//! plain tungstenite client, the same way a browser-side terminal would.
//! No SSH endpoint is involved: the targets point at missing key material,
//! so a dial fails deterministically before any network I/O.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use termgate::{AppState, ShellTunables, TargetRegistry};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

const TARGETS: &str = r#"
[[targets]]
id = "t1"
host = "192.0.2.10"
username = "student"
key_path = "/nonexistent/termgate-gateway-test-key"
"#;

async fn spawn_gateway() -> (SocketAddr, Arc<AppState>) {
    let targets = TargetRegistry::from_toml_str(TARGETS).unwrap();
    let state = Arc::new(AppState::new(targets, ShellTunables::default()));
    let app = termgate::server::router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

async fn next_json(
    socket: &mut (impl StreamExt<Item = tokio_tungstenite::tungstenite::Result<Message>> + Unpin),
) -> serde_json::Value {
    let message = socket.next().await.unwrap().unwrap();
    let Message::Text(text) = message else {
        panic!("expected a text payload, got {message:?}");
    };
    serde_json::from_str(&text).unwrap()
}

async fn next_close_code(
    socket: &mut (impl StreamExt<Item = tokio_tungstenite::tungstenite::Result<Message>> + Unpin),
) -> CloseCode {
    let message = socket.next().await.unwrap().unwrap();
    let Message::Close(Some(frame)) = message else {
        panic!("expected a close frame, got {message:?}");
    };
    frame.code
}

async fn wait_for_empty_registry(state: &AppState) {
    for _ in 0..50 {
        if state.sessions.count() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("session registry never drained: {} left", state.sessions.count());
}

#[tokio::test]
async fn test_unknown_target_is_rejected_without_a_session() {
    let (addr, state) = spawn_gateway().await;

    let (mut socket, _) = connect_async(format!("ws://{addr}/ws/terminal?target=bogus"))
        .await
        .unwrap();

    let error = next_json(&mut socket).await;
    assert_eq!(error["type"], "error");
    assert_eq!(
        error["message"],
        "Invalid target: bogus. Available targets: t1"
    );

    assert_eq!(next_close_code(&mut socket).await, CloseCode::Policy);
    assert_eq!(state.sessions.count(), 0, "rejection must never register");
}

#[tokio::test]
async fn test_missing_target_parameter_is_rejected() {
    let (addr, state) = spawn_gateway().await;

    let (mut socket, _) = connect_async(format!("ws://{addr}/ws/terminal"))
        .await
        .unwrap();

    let error = next_json(&mut socket).await;
    assert_eq!(error["type"], "error");
    assert!(
        error["message"]
            .as_str()
            .unwrap()
            .starts_with("Missing target parameter")
    );

    assert_eq!(next_close_code(&mut socket).await, CloseCode::Policy);
    assert_eq!(state.sessions.count(), 0);
}

#[tokio::test]
async fn test_failed_dial_reports_error_and_clears_registry() {
    let (addr, state) = spawn_gateway().await;

    let (mut socket, _) = connect_async(format!("ws://{addr}/ws/terminal?target=t1"))
        .await
        .unwrap();

    // The key file does not exist, so the dial fails before any SSH traffic.
    let error = next_json(&mut socket).await;
    assert_eq!(error["type"], "error");
    assert!(
        error["message"]
            .as_str()
            .unwrap()
            .starts_with("Connection failed:")
    );

    assert_eq!(next_close_code(&mut socket).await, CloseCode::Error);

    // Registry removal runs just after the close frame is sent.
    wait_for_empty_registry(&state).await;
}
