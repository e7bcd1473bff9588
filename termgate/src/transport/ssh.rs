//! Remote shell handler built on russh.
//!
//! A [`RemoteShell`] owns exactly one outbound SSH connection and one
//! interactive shell channel to one target. The channel is driven by a
//! single task that multiplexes write/resize/close commands against shell
//! output; stdout and stderr are merged into one ordered event stream, the
//! way a terminal client expects them.
//!
//! Host keys are accepted unconditionally. This gateway talks to a closed
//! set of pre-provisioned hosts, not the open internet; a production
//! deployment should pin the expected host key per target instead.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use log::{debug, info, warn};
use russh::client::{self, Handle, Msg};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey, load_secret_key};
use russh::{Channel, ChannelMsg, Disconnect};
use tokio::sync::mpsc;

use super::config::ShellTunables;
use crate::error::{Result, TransportError};
use crate::registry::TargetDescriptor;

/// Capacity of the shell output event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Output-side events pushed by the shell task.
#[derive(Debug)]
pub enum ShellEvent {
    /// A chunk of shell output (stdout and stderr merged).
    Output(Bytes),

    /// The shell or its transport went away. Always the final event.
    Closed(ShellClosed),
}

/// How the shell ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellClosed {
    /// The shell ended on its own terms: the user exited or the remote
    /// side closed the stream. Not an error, whatever the exit status.
    Exited { status: Option<u32> },

    /// The channel or transport died underneath the shell.
    Failed { reason: String },
}

impl fmt::Display for ShellClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShellClosed::Exited {
                status: Some(status),
            } => write!(f, "shell exited with status {status}"),
            ShellClosed::Exited { status: None } => f.write_str("shell closed"),
            ShellClosed::Failed { reason } => f.write_str(reason),
        }
    }
}

/// Commands accepted by the shell task.
#[derive(Debug, PartialEq)]
pub(crate) enum ShellCommand {
    Data(Bytes),
    Resize { rows: u32, cols: u32 },
    Close,
}

/// Handle to one interactive shell on one remote host.
///
/// Writes and resizes are fire-and-forget: once the shell is gone they are
/// logged and dropped, never surfaced as errors, so a teardown race cannot
/// crash a live session. Transport death is reported through the event
/// stream as a terminal [`ShellEvent::Closed`].
pub struct RemoteShell {
    cmd_tx: mpsc::UnboundedSender<ShellCommand>,
    closed: Arc<AtomicBool>,
}

impl RemoteShell {
    /// Dial the target, authenticate, and open an interactive shell.
    ///
    /// Requests a pty with the configured terminal type and initial size,
    /// then a shell. Returns the handle together with the receiving end of
    /// the output event stream.
    pub async fn open(
        target: &TargetDescriptor,
        tunables: &ShellTunables,
    ) -> Result<(Self, mpsc::Receiver<ShellEvent>)> {
        // Load key material first: a missing credential should fail before
        // any network traffic.
        let key = load_secret_key(&target.key_path, None).map_err(|err| {
            TransportError::Key(format!(
                "cannot load private key {}: {err}",
                target.key_path.display()
            ))
        })?;

        let ssh_config = Arc::new(client::Config {
            keepalive_interval: Some(tunables.keepalive_interval),
            keepalive_max: tunables.keepalive_max,
            ..Default::default()
        });

        debug!(
            "dialing {}:{} as {}",
            target.host, target.port, target.username
        );

        let mut session = tokio::time::timeout(
            tunables.dial_timeout,
            client::connect(
                ssh_config,
                (target.host.as_str(), target.port),
                AcceptAllHosts,
            ),
        )
        .await
        .map_err(|_| TransportError::Timeout(tunables.dial_timeout))?
        .map_err(TransportError::Ssh)?;

        Self::authenticate(&mut session, target, key).await?;

        let channel = session
            .channel_open_session()
            .await
            .map_err(TransportError::Ssh)?;

        channel
            .request_pty(
                true,
                &tunables.term,
                tunables.initial_cols,
                tunables.initial_rows,
                0,
                0,
                &[],
            )
            .await
            .map_err(TransportError::ShellNegotiation)?;

        channel
            .request_shell(true)
            .await
            .map_err(TransportError::ShellNegotiation)?;

        info!(
            "shell open on {}:{} ({}x{} {})",
            target.host, target.port, tunables.initial_cols, tunables.initial_rows, tunables.term
        );

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        tokio::spawn(shell_task(
            session,
            channel,
            cmd_rx,
            event_tx,
            closed.clone(),
        ));

        Ok((Self { cmd_tx, closed }, event_rx))
    }

    /// Authenticate with the target's private key.
    async fn authenticate(
        session: &mut Handle<AcceptAllHosts>,
        target: &TargetDescriptor,
        key: russh::keys::PrivateKey,
    ) -> Result<()> {
        let hash_alg = session
            .best_supported_rsa_hash()
            .await
            .map_err(TransportError::Ssh)?
            .flatten();

        let success = session
            .authenticate_publickey(
                &target.username,
                PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
            )
            .await
            .map_err(TransportError::Ssh)?
            .success();

        if !success {
            return Err(TransportError::AuthenticationFailed {
                user: target.username.clone(),
            }
            .into());
        }

        Ok(())
    }

    /// Forward bytes to the remote shell's input.
    ///
    /// Silently drops the data (with a log line) when the shell is no
    /// longer writable.
    pub fn write(&self, data: Bytes) {
        if self.closed.load(Ordering::Acquire) {
            debug!("dropping {} bytes: shell already closed", data.len());
            return;
        }
        if let Err(err) = self.cmd_tx.send(ShellCommand::Data(data)) {
            warn!("cannot write to shell: {err}");
        }
    }

    /// Propagate a window-size change to the remote pty.
    ///
    /// No-op when no shell is open.
    pub fn resize(&self, rows: u16, cols: u16) {
        if self.closed.load(Ordering::Acquire) {
            debug!("ignoring resize: shell already closed");
            return;
        }
        let command = ShellCommand::Resize {
            rows: u32::from(rows),
            cols: u32::from(cols),
        };
        if let Err(err) = self.cmd_tx.send(command) {
            warn!("cannot resize shell: {err}");
        }
    }

    /// Terminate the shell channel and the underlying transport.
    ///
    /// Idempotent and safe to call while output delivery is in flight.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.cmd_tx.send(ShellCommand::Close);
    }

    /// Whether the shell has been closed (from either side).
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Build a handler wired to a plain command queue, for exercising the
    /// command-side contract without a network.
    #[cfg(test)]
    pub(crate) fn test_pair() -> (Self, mpsc::UnboundedReceiver<ShellCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        (
            Self {
                cmd_tx,
                closed: Arc::new(AtomicBool::new(false)),
            },
            cmd_rx,
        )
    }
}

/// Drives one shell channel: multiplexes inbound commands against shell
/// output until either side goes away, then tears the transport down and
/// emits the final `Closed` event.
async fn shell_task(
    session: Handle<AcceptAllHosts>,
    mut channel: Channel<Msg>,
    mut cmd_rx: mpsc::UnboundedReceiver<ShellCommand>,
    event_tx: mpsc::Sender<ShellEvent>,
    closed: Arc<AtomicBool>,
) {
    let mut exit_status = None;

    let outcome = loop {
        tokio::select! {
            command = cmd_rx.recv() => match command {
                Some(ShellCommand::Data(data)) => {
                    if let Err(err) = channel.data(&data[..]).await {
                        warn!("shell write failed: {err}");
                        break ShellClosed::Failed {
                            reason: format!("shell write failed: {err}"),
                        };
                    }
                }
                Some(ShellCommand::Resize { rows, cols }) => {
                    match channel.window_change(cols, rows, 0, 0).await {
                        Ok(()) => debug!("terminal resized to {cols}x{rows}"),
                        Err(err) => warn!("window change failed: {err}"),
                    }
                }
                Some(ShellCommand::Close) | None => {
                    break ShellClosed::Exited { status: exit_status };
                }
            },
            msg = channel.wait() => match msg {
                Some(ChannelMsg::Data { ref data }) => {
                    if event_tx
                        .send(ShellEvent::Output(Bytes::copy_from_slice(data)))
                        .await
                        .is_err()
                    {
                        // Receiver dropped: the session is gone.
                        break ShellClosed::Exited { status: exit_status };
                    }
                }
                Some(ChannelMsg::ExtendedData { ref data, .. }) => {
                    // stderr; merged into the same outward stream.
                    if event_tx
                        .send(ShellEvent::Output(Bytes::copy_from_slice(data)))
                        .await
                        .is_err()
                    {
                        break ShellClosed::Exited { status: exit_status };
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status: status }) => {
                    debug!("remote shell exited with status {status}");
                    exit_status = Some(status);
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) => {
                    break ShellClosed::Exited { status: exit_status };
                }
                Some(_) => {}
                None => {
                    break ShellClosed::Failed {
                        reason: String::from("transport closed"),
                    };
                }
            },
        }
    };

    closed.store(true, Ordering::Release);

    // Best-effort teardown: both calls may race a transport that is
    // already gone.
    let _ = channel.eof().await;
    let _ = session
        .disconnect(Disconnect::ByApplication, "", "en")
        .await;

    debug!("shell task finished: {outcome}");
    let _ = event_tx.send(ShellEvent::Closed(outcome)).await;
}

/// Client handler that accepts any host key.
///
/// Appropriate only for a fixed fleet of known hosts; see the module docs.
struct AcceptAllHosts;

impl client::Handler for AcceptAllHosts {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_writes_preserve_submission_order() {
        let (shell, mut cmd_rx) = RemoteShell::test_pair();

        for i in 0..10u8 {
            shell.write(Bytes::from(vec![i]));
        }

        for i in 0..10u8 {
            assert_eq!(
                cmd_rx.recv().await,
                Some(ShellCommand::Data(Bytes::from(vec![i])))
            );
        }
    }

    #[tokio::test]
    async fn test_resize_is_forwarded_once() {
        let (shell, mut cmd_rx) = RemoteShell::test_pair();

        shell.resize(40, 120);

        assert_eq!(
            cmd_rx.recv().await,
            Some(ShellCommand::Resize {
                rows: 40,
                cols: 120
            })
        );
        assert!(cmd_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (shell, mut cmd_rx) = RemoteShell::test_pair();

        shell.close();
        shell.close();
        shell.close();

        assert_eq!(cmd_rx.recv().await, Some(ShellCommand::Close));
        assert!(cmd_rx.try_recv().is_err());
        assert!(shell.is_closed());
    }

    #[tokio::test]
    async fn test_write_after_close_is_dropped_silently() {
        let (shell, mut cmd_rx) = RemoteShell::test_pair();

        shell.close();
        shell.write(Bytes::from_static(b"ls\n"));
        shell.resize(24, 80);

        assert_eq!(cmd_rx.recv().await, Some(ShellCommand::Close));
        assert!(cmd_rx.try_recv().is_err());
    }

    #[test]
    fn test_shell_closed_describes_the_cause() {
        assert_eq!(
            ShellClosed::Exited { status: Some(0) }.to_string(),
            "shell exited with status 0"
        );
        assert_eq!(ShellClosed::Exited { status: None }.to_string(), "shell closed");
        assert_eq!(
            ShellClosed::Failed {
                reason: String::from("transport closed")
            }
            .to_string(),
            "transport closed"
        );
    }

    #[tokio::test]
    async fn test_write_survives_dropped_task() {
        let (shell, cmd_rx) = RemoteShell::test_pair();
        drop(cmd_rx);

        // Must log and return, not panic or error.
        shell.write(Bytes::from_static(b"echo hi\n"));
        shell.resize(24, 80);
    }
}
