//! HTTP server and connection accept loop.
//!
//! One axum router carries the WebSocket terminal endpoint plus the
//! diagnostics surface (`/health`, `/info`, `/connections`). Shutdown is
//! driven by SIGTERM or Ctrl-C: the listener stops accepting, every
//! registered session is signaled to clean up, the registry is cleared,
//! and the serve loop drains.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::Response;
use axum::routing::get;
use log::{error, info};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::{Result, ServerError};
use crate::registry::TargetRegistry;
use crate::session;
use crate::sessions::{SessionRegistry, SessionSnapshot};
use crate::transport::ShellTunables;

/// WebSocket path the gateway serves terminals on.
pub const WEBSOCKET_PATH: &str = "/ws/terminal";

/// Shared state handed to every handler.
#[derive(Debug)]
pub struct AppState {
    /// Static target registry, immutable after load.
    pub targets: TargetRegistry,

    /// Live session registry.
    pub sessions: Arc<SessionRegistry>,

    /// Shell connection tunables applied to every session.
    pub tunables: ShellTunables,

    /// Server start instant, for uptime reporting.
    pub started: Instant,
}

impl AppState {
    /// Create server state around a loaded target registry.
    pub fn new(targets: TargetRegistry, tunables: ShellTunables) -> Self {
        Self {
            targets,
            sessions: Arc::new(SessionRegistry::new()),
            tunables,
            started: Instant::now(),
        }
    }

    /// Build the liveness report.
    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "ok",
            uptime_seconds: self.started.elapsed().as_secs(),
            available_targets: self.targets.identifiers(),
            active_sessions: self.sessions.count(),
            target_warnings: self.targets.validate(),
            timestamp: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z")),
        }
    }

    /// Build the service description.
    pub fn info(&self) -> ServiceInfo {
        ServiceInfo {
            service: "termgate",
            version: env!("CARGO_PKG_VERSION"),
            available_targets: self.targets.identifiers(),
            active_sessions: self.sessions.count(),
            websocket_path: WEBSOCKET_PATH,
        }
    }

    /// Build the active-session listing.
    pub fn connections(&self) -> SessionListing {
        let sessions = self.sessions.snapshot();
        SessionListing {
            count: sessions.len(),
            sessions,
        }
    }
}

/// `/health` response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    pub uptime_seconds: u64,
    pub available_targets: Vec<String>,
    pub active_sessions: usize,
    pub target_warnings: Vec<String>,
    pub timestamp: String,
}

/// `/info` response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    pub service: &'static str,
    pub version: &'static str,
    pub available_targets: Vec<String>,
    pub active_sessions: usize,
    pub websocket_path: &'static str,
}

/// `/connections` response body.
#[derive(Debug, Serialize)]
pub struct SessionListing {
    pub count: usize,
    pub sessions: Vec<SessionSnapshot>,
}

/// Query parameters accepted on the WebSocket endpoint.
#[derive(Debug, Deserialize)]
struct WsParams {
    target: Option<String>,
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(WEBSOCKET_PATH, get(ws_terminal))
        .route("/health", get(health))
        .route("/info", get(service_info))
        .route("/connections", get(connections))
        .with_state(state)
}

async fn ws_terminal(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| session::serve_session(socket, params.target, state))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthReport> {
    Json(state.health())
}

async fn service_info(State(state): State<Arc<AppState>>) -> Json<ServiceInfo> {
    Json(state.info())
}

async fn connections(State(state): State<Arc<AppState>>) -> Json<SessionListing> {
    Json(state.connections())
}

/// Bind the listener and serve until a termination signal arrives.
///
/// On signal: stop accepting, drain the session registry, then let the
/// in-flight connections (now closing) finish.
pub async fn run(addr: SocketAddr, state: Arc<AppState>) -> Result<()> {
    let app = router(state.clone());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;

    info!("listening on {addr}");
    info!("websocket endpoint: ws://{addr}{WEBSOCKET_PATH}");
    info!("health check: http://{addr}/health");

    let sessions = state.sessions.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            sessions.shutdown();
        })
        .await
        .map_err(ServerError::Io)?;

    info!("server stopped");
    Ok(())
}

/// Resolve when SIGTERM or Ctrl-C is received.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(err) => {
                    error!("cannot install SIGTERM handler: {err}");
                    let _ = tokio::signal::ctrl_c().await;
                    info!("SIGINT received, shutting down");
                    return;
                }
            };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("SIGINT received, shutting down"),
            _ = sigterm.recv() => info!("SIGTERM received, shutting down gracefully"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("SIGINT received, shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::SessionState;

    fn test_state() -> AppState {
        let targets = TargetRegistry::from_toml_str(
            r#"
            [[targets]]
            id = "t1"
            host = "192.0.2.10"
            username = "student"
            key_path = "/tmp/termgate-test-missing-key"

            [[targets]]
            id = "t2"
            host = "192.0.2.11"
            username = "student"
            key_path = "/tmp/termgate-test-missing-key"
            "#,
        )
        .unwrap();
        AppState::new(targets, ShellTunables::default())
    }

    #[test]
    fn test_health_report_shape() {
        let state = test_state();
        let report = state.health();

        assert_eq!(report.status, "ok");
        assert_eq!(report.available_targets, vec!["t1", "t2"]);
        assert_eq!(report.active_sessions, 0);
        assert!(!report.target_warnings.is_empty(), "missing key files warn");

        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("availableTargets").is_some());
        assert!(json.get("activeSessions").is_some());
    }

    #[test]
    fn test_info_names_websocket_path() {
        let state = test_state();
        let info = state.info();
        assert_eq!(info.service, "termgate");
        assert_eq!(info.websocket_path, "/ws/terminal");
    }

    #[test]
    fn test_connections_listing_follows_registry() {
        let state = test_state();
        assert_eq!(state.connections().count, 0);

        let (id, _close_rx) = state.sessions.register("t1");
        state.sessions.set_state(&id, SessionState::ShellOpen);

        let listing = state.connections();
        assert_eq!(listing.count, 1);
        assert_eq!(listing.sessions[0].target, "t1");
        assert!(listing.sessions[0].is_active);

        state.sessions.remove(&id);
        assert_eq!(state.connections().count, 0);
    }

    #[test]
    fn test_router_builds() {
        let state = Arc::new(test_state());
        let _app = router(state);
    }
}
