//! Gateway wire protocol: op-codes, the [`Envelope`] frame type and the
//! builders for outbound frames.
//!
//! Dispatch payloads stay semi-structured (`serde_json::Value`); only the
//! control payloads the state machine acts on are typed.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

// =============================================================================
// Op-codes
// =============================================================================

/// Gateway op-codes.
pub mod opcode {
    /// Application event (inbound).
    pub const DISPATCH: u8 = 0;
    /// Heartbeat carrying the last sequence (outbound).
    pub const HEARTBEAT: u8 = 1;
    /// Identify a new session (outbound).
    pub const IDENTIFY: u8 = 2;
    /// Resume a previous session (outbound).
    pub const RESUME: u8 = 6;
    /// Session parameters rejected (inbound).
    pub const INVALID_SESSION: u8 = 9;
    /// First frame after connect, carries the heartbeat interval (inbound).
    pub const HELLO: u8 = 10;
    /// Heartbeat acknowledged (inbound).
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// Dispatch type marking a freshly identified session.
pub const READY: &str = "READY";

/// Dispatch type marking a successfully resumed session.
pub const RESUMED: &str = "RESUMED";

// =============================================================================
// Envelope
// =============================================================================

/// One decoded gateway frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Op-code, see [`opcode`].
    #[serde(rename = "op")]
    pub op_code: u8,
    /// Frame payload.
    #[serde(rename = "d", default)]
    pub payload: Value,
    /// Sequence number, present on dispatch frames.
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    /// Event type, present on dispatch frames.
    #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    /// Event id, present on some dispatch frames.
    #[serde(rename = "id", default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

impl Envelope {
    /// Creates a control frame with the given op-code and payload.
    pub fn control(op_code: u8, payload: Value) -> Self {
        Self {
            op_code,
            payload,
            sequence: None,
            event_type: None,
            event_id: None,
        }
    }

    /// Creates a dispatch frame. Mostly useful in tests.
    pub fn dispatch(event_type: impl Into<String>, sequence: u64, payload: Value) -> Self {
        Self {
            op_code: opcode::DISPATCH,
            payload,
            sequence: Some(sequence),
            event_type: Some(event_type.into()),
            event_id: None,
        }
    }

    /// Attaches an event id.
    pub fn with_event_id(mut self, id: impl Into<String>) -> Self {
        self.event_id = Some(id.into());
        self
    }

    /// Parses an envelope from a text frame.
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Serializes the envelope into a text frame.
    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Typed Control Payloads
// =============================================================================

/// Hello payload (`op=10`).
#[derive(Debug, Clone, Deserialize)]
pub struct HelloPayload {
    /// Heartbeat interval in milliseconds.
    pub heartbeat_interval: u64,
}

/// Ready dispatch payload (`t="READY"`).
#[derive(Debug, Clone, Deserialize)]
pub struct ReadyPayload {
    /// Session id to resume with.
    pub session_id: String,
    /// Shard assignment echoed back by the server.
    #[serde(default)]
    pub shard: Option<[u32; 2]>,
}

// =============================================================================
// Outbound Frame Builders
// =============================================================================

/// Builds an identify frame (`op=2`).
pub fn identify(token: &str, intents: u32, shard_index: u32, shard_total: u32) -> Envelope {
    Envelope::control(
        opcode::IDENTIFY,
        json!({
            "token": token,
            "intents": intents,
            "shard": [shard_index, shard_total],
        }),
    )
}

/// Builds a resume frame (`op=6`).
pub fn resume(token: &str, session_id: &str, sequence: Option<u64>) -> Envelope {
    Envelope::control(
        opcode::RESUME,
        json!({
            "token": token,
            "session_id": session_id,
            "seq": sequence,
        }),
    )
}

/// Builds a heartbeat frame (`op=1`) carrying the last seen sequence.
pub fn heartbeat(sequence: Option<u64>) -> Envelope {
    Envelope::control(opcode::HEARTBEAT, json!(sequence))
}
