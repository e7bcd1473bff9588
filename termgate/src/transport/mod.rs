//! SSH transport layer.
//!
//! Wraps russh with the remote shell lifecycle used by the session proxy:
//! dial, authenticate, negotiate a pty and shell, then relay bytes through
//! a single task that owns the channel.

pub mod config;
pub mod ssh;

pub use config::ShellTunables;
pub use ssh::{RemoteShell, ShellClosed, ShellEvent};
