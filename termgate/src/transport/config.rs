//! Remote shell connection tunables.

use std::time::Duration;

/// Tunables for dialing and holding an interactive shell connection.
///
/// The defaults mirror common SSH client settings: a 30 second dial budget
/// and keepalive probes every 10 seconds with three tolerated misses before
/// the transport is declared dead.
#[derive(Debug, Clone)]
pub struct ShellTunables {
    /// Budget for dial, handshake, and authentication combined.
    pub dial_timeout: Duration,

    /// Interval between keepalive probes.
    pub keepalive_interval: Duration,

    /// Consecutive unanswered probes tolerated before disconnecting.
    pub keepalive_max: usize,

    /// Terminal type requested with the pty.
    pub term: String,

    /// Initial terminal width in columns.
    pub initial_cols: u32,

    /// Initial terminal height in rows.
    pub initial_rows: u32,
}

impl Default for ShellTunables {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(30),
            keepalive_interval: Duration::from_secs(10),
            keepalive_max: 3,
            term: "xterm-256color".to_string(),
            initial_cols: 80,
            initial_rows: 24,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tunables() {
        let tunables = ShellTunables::default();
        assert_eq!(tunables.dial_timeout, Duration::from_secs(30));
        assert_eq!(tunables.keepalive_interval, Duration::from_secs(10));
        assert_eq!(tunables.keepalive_max, 3);
        assert_eq!(tunables.term, "xterm-256color");
        assert_eq!((tunables.initial_cols, tunables.initial_rows), (80, 24));
    }
}
