//! Session proxy: pairs one client WebSocket with one remote shell.
//!
//! A session moves through `Initiating → ShellOpen → Closing → Closed`.
//! The proxy validates the requested target before anything else, registers
//! the session so it is observable while the dial is in flight, then runs a
//! single relay task that owns the socket's write half. That task is the
//! only writer, so status messages and shell output are serialized per
//! session by construction.
//!
//! Every failure source (client close or error, shell death, transport
//! death, server shutdown) funnels into the same cleanup path, which closes
//! the shell, closes the client connection, and removes the registry entry
//! exactly once.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::sync::{mpsc, watch};

use crate::error::ConfigError;
use crate::protocol::{
    CLOSE_NORMAL, CLOSE_POLICY_VIOLATION, CLOSE_UPSTREAM_FAILURE, ClientFrame, ServerMessage,
    parse_client_frame,
};
use crate::registry::TargetDescriptor;
use crate::server::AppState;
use crate::sessions::{SessionRegistry, SessionState};
use crate::transport::{RemoteShell, ShellClosed, ShellEvent, ShellTunables};

/// Why the relay stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Disposition {
    /// The client closed the socket or the socket errored.
    ClientGone,

    /// The remote shell ended cleanly (user exited, remote EOF).
    RemoteExited,

    /// The remote shell or its transport died.
    RemoteFailed { reason: String },

    /// The server is shutting down.
    Shutdown,
}

impl From<ShellClosed> for Disposition {
    fn from(closed: ShellClosed) -> Self {
        match closed {
            ShellClosed::Exited { .. } => Disposition::RemoteExited,
            ShellClosed::Failed { reason } => Disposition::RemoteFailed { reason },
        }
    }
}

/// What the client is told on teardown: an optional error payload followed
/// by the close frame. Only a transport-side failure is an error; a clean
/// remote exit, a departed client, and a server shutdown all close with the
/// normal code.
fn closing_messages(disposition: &Disposition) -> (Option<String>, CloseFrame) {
    match disposition {
        Disposition::ClientGone => (
            None,
            CloseFrame {
                code: CLOSE_NORMAL,
                reason: "".into(),
            },
        ),
        Disposition::RemoteExited => (
            None,
            CloseFrame {
                code: CLOSE_NORMAL,
                reason: "shell exited".into(),
            },
        ),
        Disposition::RemoteFailed { reason } => (
            Some(
                ServerMessage::Error {
                    message: reason.clone(),
                }
                .to_json(),
            ),
            CloseFrame {
                code: CLOSE_UPSTREAM_FAILURE,
                reason: "upstream failure".into(),
            },
        ),
        Disposition::Shutdown => (
            None,
            CloseFrame {
                code: CLOSE_NORMAL,
                reason: "server shutting down".into(),
            },
        ),
    }
}

/// Entry point for one accepted WebSocket connection.
///
/// Validates the target parameter, registers the session, and hands off to
/// the proxy. Missing or unknown targets are rejected with a structured
/// error and the policy-violation close code before any session state or
/// remote handler exists.
pub(crate) async fn serve_session(
    socket: WebSocket,
    target_param: Option<String>,
    state: Arc<AppState>,
) {
    let Some(target_id) = target_param else {
        warn!("connection rejected: missing target parameter");
        reject(socket, ConfigError::MissingTarget.to_string()).await;
        return;
    };

    let target = match state.targets.lookup(&target_id) {
        Ok(descriptor) => descriptor.clone(),
        Err(err) => {
            warn!("connection rejected: {err}");
            reject(socket, err.to_string()).await;
            return;
        }
    };

    let (session_id, close_rx) = state.sessions.register(&target_id);
    info!(
        "[{session_id}] [{target_id}] session registered ({} active)",
        state.sessions.count()
    );

    let proxy = SessionProxy {
        session_id,
        target,
        sessions: state.sessions.clone(),
        tunables: state.tunables.clone(),
    };
    proxy.run(socket, close_rx).await;
}

/// Reject a connection that never becomes a session.
async fn reject(mut socket: WebSocket, message: String) {
    let payload = ServerMessage::Error { message }.to_json();
    let _ = socket.send(Message::Text(payload.into())).await;
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: CLOSE_POLICY_VIOLATION,
            reason: "invalid target".into(),
        })))
        .await;
}

/// One end-to-end proxied terminal session.
struct SessionProxy {
    session_id: String,
    target: TargetDescriptor,
    sessions: Arc<SessionRegistry>,
    tunables: ShellTunables,
}

impl SessionProxy {
    async fn run(self, socket: WebSocket, mut close_rx: watch::Receiver<bool>) {
        let (mut ws_tx, mut ws_rx) = socket.split();

        // Dial while watching the socket: a departing client must cancel
        // the in-flight connection attempt promptly.
        let opened = self.open_shell(&mut ws_rx, &mut close_rx).await;

        let (shell, events) = match opened {
            Ok(Some(pair)) => pair,
            Ok(None) => {
                debug!("[{}] client left before shell was ready", self.session_id);
                self.finish(None, &mut ws_tx, Disposition::ClientGone).await;
                return;
            }
            Err(err) => {
                warn!("[{}] shell open failed: {err}", self.session_id);
                self.finish(
                    None,
                    &mut ws_tx,
                    Disposition::RemoteFailed {
                        reason: format!("Connection failed: {err}"),
                    },
                )
                .await;
                return;
            }
        };

        self.sessions
            .set_state(&self.session_id, SessionState::ShellOpen);

        let ready = ServerMessage::Connected {
            target: self.target.id.clone(),
            session_id: self.session_id.clone(),
        };
        if ws_tx.send(Message::Text(ready.to_json().into())).await.is_err() {
            self.finish(Some(&shell), &mut ws_tx, Disposition::ClientGone)
                .await;
            return;
        }
        info!("[{}] [{}] relay started", self.session_id, self.target.id);

        let disposition = self
            .relay(&mut ws_tx, &mut ws_rx, &shell, events, &mut close_rx)
            .await;
        self.finish(Some(&shell), &mut ws_tx, disposition).await;
    }

    /// Open the remote shell, cancellable by client departure or shutdown.
    ///
    /// Returns `Ok(None)` when the client went away first; the dial future
    /// is dropped, which aborts the attempt.
    async fn open_shell(
        &self,
        ws_rx: &mut SplitStream<WebSocket>,
        close_rx: &mut watch::Receiver<bool>,
    ) -> crate::error::Result<Option<(RemoteShell, mpsc::Receiver<ShellEvent>)>> {
        let open = RemoteShell::open(&self.target, &self.tunables);
        tokio::pin!(open);

        loop {
            tokio::select! {
                result = &mut open => return result.map(Some),
                message = ws_rx.next() => match message {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return Ok(None),
                    Some(Ok(_)) => {
                        debug!(
                            "[{}] dropping client frame received before shell is ready",
                            self.session_id
                        );
                    }
                },
                _ = close_rx.changed() => return Ok(None),
            }
        }
    }

    /// Bidirectional relay until either side goes away.
    async fn relay(
        &self,
        ws_tx: &mut SplitSink<WebSocket, Message>,
        ws_rx: &mut SplitStream<WebSocket>,
        shell: &RemoteShell,
        mut events: mpsc::Receiver<ShellEvent>,
        close_rx: &mut watch::Receiver<bool>,
    ) -> Disposition {
        loop {
            tokio::select! {
                message = ws_rx.next() => match message {
                    Some(Ok(Message::Close(frame))) => {
                        debug!("[{}] client closed: {frame:?}", self.session_id);
                        return Disposition::ClientGone;
                    }
                    Some(Ok(message)) => self.handle_client_frame(shell, &message),
                    Some(Err(err)) => {
                        warn!("[{}] client connection error: {err}", self.session_id);
                        return Disposition::ClientGone;
                    }
                    None => return Disposition::ClientGone,
                },
                event = events.recv() => match event {
                    Some(ShellEvent::Output(chunk)) => {
                        if ws_tx.send(Message::Binary(chunk)).await.is_err() {
                            return Disposition::ClientGone;
                        }
                    }
                    Some(ShellEvent::Closed(closed)) => {
                        info!("[{}] remote shell closed: {closed}", self.session_id);
                        return closed.into();
                    }
                    None => {
                        return Disposition::RemoteFailed {
                            reason: String::from("shell task ended"),
                        };
                    }
                },
                _ = close_rx.changed() => return Disposition::Shutdown,
            }
        }
    }

    /// Dispatch one inbound frame to the shell.
    fn handle_client_frame(&self, shell: &RemoteShell, message: &Message) {
        let payload: &[u8] = match message {
            Message::Text(text) => text.as_bytes(),
            Message::Binary(bytes) => bytes,
            // Ping/pong are answered by the websocket layer.
            _ => return,
        };

        match parse_client_frame(payload) {
            ClientFrame::Input(data) => shell.write(data),
            ClientFrame::Resize { rows, cols } => shell.resize(rows, cols),
        }
    }

    /// Idempotent teardown: close the shell, close the client connection,
    /// remove the session from the registry exactly once.
    async fn finish(
        &self,
        shell: Option<&RemoteShell>,
        ws_tx: &mut SplitSink<WebSocket, Message>,
        disposition: Disposition,
    ) {
        self.sessions
            .set_state(&self.session_id, SessionState::Closing);

        if let Some(shell) = shell {
            shell.close();
        }

        // Everything here is best-effort: the client may already be gone.
        let (payload, frame) = closing_messages(&disposition);
        if let Some(payload) = payload {
            let _ = ws_tx.send(Message::Text(payload.into())).await;
        }
        let _ = ws_tx.send(Message::Close(Some(frame))).await;

        self.sessions
            .set_state(&self.session_id, SessionState::Closed);
        let removed = self.sessions.remove(&self.session_id);
        info!(
            "[{}] session finished ({disposition:?}, removed={removed}, {} active)",
            self.session_id,
            self.sessions.count()
        );
    }
}
