use async_trait::async_trait;

use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Text,
    Binary,
    Ping,
    Pong,
}

/// One raw transport frame. A fragmented message arrives as several
/// `Data` frames sharing the message's kind, the last one marked final.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Data {
        kind: FrameKind,
        payload: Vec<u8>,
        is_final: bool,
    },
    Close {
        code: Option<u16>,
        reason: String,
    },
}

/// Receiving half of the transport.
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` once the stream is exhausted.
    async fn next_frame(&mut self) -> Result<Option<Frame>, ClientError>;
}

/// Sending half of the transport. Callers serialize access through a
/// mutex so only one send is ever in flight.
#[async_trait]
pub trait FrameSink: Send {
    async fn send_text(&mut self, text: String) -> Result<(), ClientError>;
    async fn close(&mut self, code: u16, reason: &str) -> Result<(), ClientError>;
}

/// One fully reassembled inbound unit.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Message(String),
    Closed { code: Option<u16>, reason: String },
}

/// Pull frames until one complete logical message is assembled.
///
/// Text fragments are concatenated in order; only a final text frame
/// completes the message, so fragmentation boundaries are irrelevant.
/// A close frame short-circuits immediately (it is connection signalling,
/// not event data) and non-text frames are skipped. Returns `Ok(None)`
/// when the source ends mid-stream.
pub async fn next_message<S: FrameSource + ?Sized>(
    source: &mut S,
) -> Result<Option<Inbound>, ClientError> {
    let mut buffer: Vec<u8> = Vec::new();

    loop {
        let frame = match source.next_frame().await? {
            Some(frame) => frame,
            None => return Ok(None),
        };

        match frame {
            Frame::Close { code, reason } => {
                return Ok(Some(Inbound::Closed { code, reason }));
            }
            Frame::Data {
                kind: FrameKind::Text,
                payload,
                is_final,
            } => {
                buffer.extend_from_slice(&payload);
                if is_final {
                    let text = String::from_utf8(buffer).map_err(|e| {
                        ClientError::Protocol(format!("message is not valid UTF-8: {e}"))
                    })?;
                    return Ok(Some(Inbound::Message(text)));
                }
            }
            Frame::Data { .. } => {}
        }
    }
}
