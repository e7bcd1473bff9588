//! Client-facing wire protocol.
//!
//! Inbound WebSocket payloads are either a small JSON control message or
//! raw terminal input. Parsing is a tagged-variant step with an explicit
//! fallback: anything that does not parse as a control message is treated
//! as raw input verbatim, never dropped. Outbound structured messages are
//! the `connected` notification and `error` payloads; everything else the
//! client receives is raw shell output in binary frames.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Normal session end.
pub const CLOSE_NORMAL: u16 = 1000;

/// Bad request: missing or unknown target identifier.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Upstream failure: the remote shell died or could not be opened.
pub const CLOSE_UPSTREAM_FAILURE: u16 = 1011;

/// Structured control messages recognized from the client.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ControlMessage {
    /// Terminal input carried inside a JSON envelope.
    Input { data: String },

    /// Terminal window-size change.
    Resize { rows: u16, cols: u16 },
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    /// Bytes destined for the remote shell's input.
    Input(Bytes),

    /// Window-size change for the remote pty.
    Resize { rows: u16, cols: u16 },
}

/// Decode an inbound payload.
///
/// Control messages win; any payload that fails to parse as one is raw
/// terminal input.
pub fn parse_client_frame(payload: &[u8]) -> ClientFrame {
    match serde_json::from_slice::<ControlMessage>(payload) {
        Ok(ControlMessage::Input { data }) => ClientFrame::Input(Bytes::from(data)),
        Ok(ControlMessage::Resize { rows, cols }) => ClientFrame::Resize { rows, cols },
        Err(_) => ClientFrame::Input(Bytes::copy_from_slice(payload)),
    }
}

/// Structured messages sent to the client.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Sent exactly once, after the remote shell is open.
    Connected {
        target: String,
        #[serde(rename = "sessionId")]
        session_id: String,
    },

    /// Sent before closing with a non-normal status code.
    Error { message: String },
}

impl ServerMessage {
    /// Serialize to the JSON text sent on the socket.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input_control_message() {
        let frame = parse_client_frame(br#"{"type":"input","data":"ls\n"}"#);
        assert_eq!(frame, ClientFrame::Input(Bytes::from_static(b"ls\n")));
    }

    #[test]
    fn test_parse_resize_control_message() {
        let frame = parse_client_frame(br#"{"type":"resize","rows":40,"cols":120}"#);
        assert_eq!(
            frame,
            ClientFrame::Resize {
                rows: 40,
                cols: 120
            }
        );
    }

    #[test]
    fn test_non_json_falls_back_to_raw_input() {
        let frame = parse_client_frame(b"echo hello\n");
        assert_eq!(frame, ClientFrame::Input(Bytes::from_static(b"echo hello\n")));
    }

    #[test]
    fn test_unknown_type_falls_back_to_raw_input() {
        let payload = br#"{"type":"ping"}"#;
        let frame = parse_client_frame(payload);
        assert_eq!(frame, ClientFrame::Input(Bytes::copy_from_slice(payload)));
    }

    #[test]
    fn test_malformed_json_preserved_verbatim() {
        let payload = br#"{"type":"resize","rows":"#;
        let frame = parse_client_frame(payload);
        assert_eq!(frame, ClientFrame::Input(Bytes::copy_from_slice(payload)));
    }

    #[test]
    fn test_non_utf8_bytes_preserved_verbatim() {
        let payload = &[0x1b, 0x5b, 0x41, 0xff, 0xfe][..];
        let frame = parse_client_frame(payload);
        assert_eq!(frame, ClientFrame::Input(Bytes::copy_from_slice(payload)));
    }

    #[test]
    fn test_connected_message_shape() {
        let message = ServerMessage::Connected {
            target: String::from("t1"),
            session_id: String::from("sess-1-abc"),
        };
        assert_eq!(
            message.to_json(),
            r#"{"type":"connected","target":"t1","sessionId":"sess-1-abc"}"#
        );
    }

    #[test]
    fn test_error_message_shape() {
        let message = ServerMessage::Error {
            message: String::from("Invalid target: bogus. Available targets: t1, t2"),
        };
        assert_eq!(
            message.to_json(),
            r#"{"type":"error","message":"Invalid target: bogus. Available targets: t1, t2"}"#
        );
    }
}
