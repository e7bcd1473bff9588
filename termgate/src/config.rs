//! Server CLI implementation.
//!
//! Command-line argument parsing for the termgate server, with environment
//! variable fallbacks for deployment.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::transport::ShellTunables;

/// termgate - WebSocket terminal gateway for SSH targets.
#[derive(Debug, Parser)]
#[command(
    name = "termgate",
    version,
    about = "WebSocket terminal gateway proxying browser sessions to SSH hosts"
)]
pub struct Cli {
    /// Address to listen on
    #[arg(
        short = 'b',
        long = "bind",
        default_value = "0.0.0.0",
        env = "TERMGATE_BIND"
    )]
    pub bind_addr: IpAddr,

    /// Port to listen on
    #[arg(short = 'p', long = "port", default_value = "3001", env = "TERMGATE_PORT")]
    pub port: u16,

    /// Targets file (TOML)
    #[arg(
        short = 't',
        long = "targets",
        value_name = "FILE",
        default_value = "targets.toml",
        env = "TERMGATE_TARGETS"
    )]
    pub targets_file: PathBuf,

    /// SSH dial/handshake timeout in seconds
    #[arg(long = "dial-timeout", value_name = "SECONDS", default_value = "30")]
    pub dial_timeout: u64,

    /// SSH keepalive probe interval in seconds
    #[arg(long = "keepalive-interval", value_name = "SECONDS", default_value = "10")]
    pub keepalive_interval: u64,

    /// Consecutive missed keepalive probes tolerated before disconnecting
    #[arg(long = "keepalive-max", value_name = "COUNT", default_value = "3")]
    pub keepalive_max: usize,
}

impl Cli {
    /// Socket address to bind the listener to.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    /// Shell tunables derived from the CLI flags.
    pub fn tunables(&self) -> ShellTunables {
        ShellTunables {
            dial_timeout: Duration::from_secs(self.dial_timeout),
            keepalive_interval: Duration::from_secs(self.keepalive_interval),
            keepalive_max: self.keepalive_max,
            ..ShellTunables::default()
        }
    }
}
