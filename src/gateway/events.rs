use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Opcodes for gateway messages.
pub mod opcode {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// Close codes.
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    pub const GOING_AWAY: u16 = 1001;
    /// Sent by the client when a heartbeat goes unacknowledged. A non-1000
    /// code keeps the session resumable on the server side.
    pub const HEARTBEAT_TIMEOUT: u16 = 4000;

    /// Whether a session closed with this code may be resumed. Only a
    /// normal closure means "clean, do not resume".
    pub fn is_resumable(code: u16) -> bool {
        !matches!(code, NORMAL | GOING_AWAY)
    }
}

/// Gateway message envelope, both directions.
#[derive(Debug, Serialize, Deserialize)]
pub struct GatewayMessage {
    pub op: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<serde_json::Value>,
}

/// HELLO (op 10) payload data.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HelloData {
    pub heartbeat_interval: u64,
}

/// READY (op 0, t = "READY") payload data.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReadyData {
    #[serde(rename = "v")]
    pub version: u16,
    pub session_id: String,
    pub resume_gateway_url: String,
}

/// A decoded inbound message: the dispatch sequence number (if any) plus
/// the variant selected by `(op, t)`.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayEvent {
    pub sequence: Option<u64>,
    pub kind: GatewayEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEventKind {
    Hello(HelloData),
    HeartbeatAck,
    /// Server-requested immediate heartbeat (op 1 inbound).
    HeartbeatRequest,
    Ready(ReadyData),
    /// Catch-all for unhandled opcodes and dispatch types. Carries the raw
    /// payload untouched so the application layer can decode it itself.
    Unknown {
        op: u8,
        event_type: Option<String>,
        data: Option<serde_json::Value>,
    },
}

/// Decode one complete message. Unknown opcodes and dispatch types never
/// fail; only a missing/unparseable envelope or an unusable payload on a
/// handshake-critical opcode is an error.
pub fn decode(text: &str) -> Result<GatewayEvent, ClientError> {
    let msg: GatewayMessage = serde_json::from_str(text)
        .map_err(|e| ClientError::Protocol(format!("bad envelope: {e}")))?;

    let kind = match msg.op {
        opcode::HELLO => {
            let d = msg
                .d
                .ok_or_else(|| ClientError::Protocol("HELLO without payload".to_string()))?;
            let hello: HelloData = serde_json::from_value(d)
                .map_err(|e| ClientError::Protocol(format!("bad HELLO payload: {e}")))?;
            GatewayEventKind::Hello(hello)
        }
        opcode::HEARTBEAT_ACK => GatewayEventKind::HeartbeatAck,
        opcode::HEARTBEAT => GatewayEventKind::HeartbeatRequest,
        opcode::DISPATCH => {
            if msg.t.as_deref() == Some("READY") {
                let d = msg
                    .d
                    .ok_or_else(|| ClientError::Protocol("READY without payload".to_string()))?;
                let ready: ReadyData = serde_json::from_value(d)
                    .map_err(|e| ClientError::Protocol(format!("bad READY payload: {e}")))?;
                GatewayEventKind::Ready(ready)
            } else {
                GatewayEventKind::Unknown {
                    op: msg.op,
                    event_type: msg.t,
                    data: msg.d,
                }
            }
        }
        other => GatewayEventKind::Unknown {
            op: other,
            event_type: msg.t,
            data: msg.d,
        },
    };

    Ok(GatewayEvent {
        sequence: msg.s,
        kind,
    })
}

/// Serialize an outbound command to its wire text.
pub fn encode<T: Serialize>(command: &T) -> Result<String, ClientError> {
    Ok(serde_json::to_string(command)?)
}

/// Heartbeat (op 1). `d` is always present on the wire, null when no
/// dispatch event has been seen yet.
#[derive(Debug, Serialize)]
pub struct HeartbeatCommand {
    op: u8,
    d: Option<u64>,
}

impl HeartbeatCommand {
    pub fn new(sequence: Option<u64>) -> Self {
        Self {
            op: opcode::HEARTBEAT,
            d: sequence,
        }
    }
}

/// Identify (op 2).
#[derive(Debug, Serialize)]
pub struct IdentifyCommand {
    op: u8,
    d: IdentifyData,
}

#[derive(Debug, Serialize)]
struct IdentifyData {
    token: String,
    intents: u64,
    properties: IdentifyProperties,
}

#[derive(Debug, Serialize)]
struct IdentifyProperties {
    os: String,
    browser: String,
    device: String,
}

impl IdentifyCommand {
    pub fn new(token: &str, intents: u64) -> Self {
        let client = client_description();
        Self {
            op: opcode::IDENTIFY,
            d: IdentifyData {
                token: token.to_string(),
                intents,
                properties: IdentifyProperties {
                    os: std::env::consts::OS.to_string(),
                    browser: client.clone(),
                    device: client,
                },
            },
        }
    }
}

/// `name/version (sha)` string stamped into the identify properties.
pub fn client_description() -> String {
    format!(
        "{}/{} ({})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        env!("GIT_SHA")
    )
}
