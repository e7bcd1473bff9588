//! Error types for termgate.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for termgate operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Target configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// SSH transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Server loop errors
    #[error("Server error: {0}")]
    Server(#[from] ServerError),
}

/// Configuration layer errors (target registry, targets file).
///
/// These are reported to the requesting client and never terminate the
/// server; a misconfigured target only fails its own sessions.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Requested target identifier is not in the registry
    #[error("Invalid target: {id}. Available targets: {available}")]
    UnknownTarget { id: String, available: String },

    /// Connection request carried no target identifier
    #[error("Missing target parameter. Connect with /ws/terminal?target=<id>")]
    MissingTarget,

    /// Two targets declared with the same identifier
    #[error("Duplicate target identifier: {0}")]
    DuplicateTarget(String),

    /// Targets file could not be read
    #[error("Failed to read targets file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Targets file is not valid TOML
    #[error("Failed to parse targets file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Transport layer errors (SSH dial, authentication, shell negotiation).
#[derive(Error, Debug)]
pub enum TransportError {
    /// SSH handshake or protocol error while dialing
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication was rejected by the remote host
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// Private key material could not be loaded
    #[error("SSH key error: {0}")]
    Key(String),

    /// PTY or shell request was refused after the transport came up
    #[error("Shell negotiation failed: {0}")]
    ShellNegotiation(russh::Error),

    /// Dial or handshake exceeded the configured timeout
    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Server loop errors (listener setup, signal handling).
#[derive(Error, Debug)]
pub enum ServerError {
    /// Listener could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// I/O error while serving
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias using termgate's Error.
pub type Result<T> = std::result::Result<T, Error>;
