//! JSON-lines protocol spoken with the chat-client sidecar.
//!
//! One JSON object per line, discriminated by `type`. Inbound message fields
//! use the envelope's camelCase names; everything else is snake_case.

use std::path::PathBuf;

use {
    relay_common::MessageEnvelope,
    serde::{Deserialize, Serialize},
};

/// Messages from the sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SidecarMessage {
    InboundMessage(MessageEnvelope),
    SendResult {
        request_id: String,
        success: bool,
        #[serde(default)]
        message_id: Option<String>,
        #[serde(default)]
        error: Option<String>,
    },
    MediaResult {
        request_id: String,
        success: bool,
        #[serde(default)]
        path: Option<PathBuf>,
        #[serde(default)]
        error: Option<String>,
    },
    Connected {
        #[serde(default)]
        phone_number: Option<String>,
    },
    Qr {
        qr: String,
    },
    Disconnected {
        #[serde(default)]
        reason: Option<String>,
    },
    Error {
        error: String,
    },
}

/// Messages to the sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayMessage {
    SendText {
        request_id: String,
        chat_id: String,
        text: String,
    },
    DownloadMedia {
        request_id: String,
        message_id: String,
    },
}

/// Connection state as last reported by the sidecar.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Starting,
    /// Waiting for the user to scan a pairing code.
    AwaitingPairing,
    Connected {
        phone_number: Option<String>,
    },
    Disconnected {
        reason: Option<String>,
    },
}

/// Decode one protocol line.
pub fn decode_line(line: &str) -> relay_common::Result<SidecarMessage> {
    Ok(serde_json::from_str(line)?)
}

/// Encode one protocol line, newline included.
pub fn encode_line(msg: &RelayMessage) -> relay_common::Result<String> {
    let mut line = serde_json::to_string(msg)?;
    line.push('\n');
    Ok(line)
}
