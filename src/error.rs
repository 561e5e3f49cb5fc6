use std::fmt;

use tokio_tungstenite::tungstenite;

#[derive(Debug)]
pub enum ClientError {
    /// Gateway endpoint discovery failed (HTTP error status or bad body).
    Discovery { status: u16, body: String },
    Http(reqwest::Error),
    Transport(tungstenite::Error),
    /// A message whose envelope could not be parsed, or a recognized
    /// opcode carrying an unusable payload. The receive loop drops these
    /// and keeps the session alive.
    Protocol(String),
    Cancelled,
    AlreadyConnected,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Discovery { status, body } => {
                write!(f, "gateway discovery returned {status}: {body}")
            }
            ClientError::Http(e) => write!(f, "HTTP error: {e}"),
            ClientError::Transport(e) => write!(f, "transport error: {e}"),
            ClientError::Protocol(msg) => write!(f, "protocol violation: {msg}"),
            ClientError::Cancelled => write!(f, "operation cancelled"),
            ClientError::AlreadyConnected => write!(f, "client is already connected"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Http(e)
    }
}

impl From<tungstenite::Error> for ClientError {
    fn from(e: tungstenite::Error) -> Self {
        ClientError::Transport(e)
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Protocol(e.to_string())
    }
}
