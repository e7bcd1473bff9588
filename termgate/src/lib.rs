//! # Termgate
//!
//! WebSocket terminal gateway proxying browser sessions to SSH hosts.
//!
//! Termgate accepts a persistent WebSocket connection from a browser-side
//! terminal emulator, opens an interactive SSH shell to the requested
//! target, and relays bytes both ways until either side goes away. Targets
//! are a static, pre-provisioned set loaded from a TOML file at startup.
//!
//! ## Features
//!
//! - Async SSH shells via russh, with keepalive and a bounded dial budget
//! - Tagged JSON control frames (`input`, `resize`) with a raw-input
//!   fallback for anything that is not a control message
//! - Per-session isolation: one failed session never affects another
//! - Diagnostics endpoints (`/health`, `/info`, `/connections`) and
//!   graceful shutdown on SIGTERM/Ctrl-C
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use termgate::{AppState, ShellTunables, TargetRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), termgate::Error> {
//!     let targets = TargetRegistry::load("targets.toml".as_ref())?;
//!     let state = Arc::new(AppState::new(targets, ShellTunables::default()));
//!     termgate::server::run("0.0.0.0:3001".parse().unwrap(), state).await
//! }
//! ```

pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
mod session;
pub mod sessions;
pub mod transport;

// Re-export main types for convenience
pub use config::Cli;
pub use error::{ConfigError, Error, ServerError, TransportError};
pub use registry::{TargetDescriptor, TargetRegistry};
pub use server::AppState;
pub use sessions::{SessionRegistry, SessionSnapshot, SessionState};
pub use transport::{RemoteShell, ShellClosed, ShellEvent, ShellTunables};
