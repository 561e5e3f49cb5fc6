use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::ClientError;
use crate::gateway::frames::{Frame, FrameKind, FrameSink, FrameSource};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport for the gateway. tungstenite reassembles wire
/// fragments itself, so frames coming out of this adapter are always
/// final; the reassembler upstream handles the general case.
pub struct GatewayTransport {
    inner: WsStream,
}

impl GatewayTransport {
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let (inner, _response) = tokio::time::timeout(timeout, connect_async(url))
            .await
            .map_err(|_| {
                ClientError::Transport(tungstenite::Error::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "websocket connect timed out",
                )))
            })??;
        Ok(Self { inner })
    }

    pub fn split(self) -> (GatewaySink, GatewayStream) {
        let (write, read) = self.inner.split();
        (GatewaySink { write }, GatewayStream { read })
    }
}

pub struct GatewayStream {
    read: SplitStream<WsStream>,
}

pub struct GatewaySink {
    write: SplitSink<WsStream, Message>,
}

fn frame_from_message(msg: Message) -> Option<Frame> {
    match msg {
        Message::Text(text) => Some(Frame::Data {
            kind: FrameKind::Text,
            payload: text.as_str().as_bytes().to_vec(),
            is_final: true,
        }),
        Message::Binary(data) => Some(Frame::Data {
            kind: FrameKind::Binary,
            payload: data.to_vec(),
            is_final: true,
        }),
        Message::Ping(data) => Some(Frame::Data {
            kind: FrameKind::Ping,
            payload: data.to_vec(),
            is_final: true,
        }),
        Message::Pong(data) => Some(Frame::Data {
            kind: FrameKind::Pong,
            payload: data.to_vec(),
            is_final: true,
        }),
        Message::Close(frame) => {
            let (code, reason) = match frame {
                Some(f) => (Some(u16::from(f.code)), f.reason.to_string()),
                None => (None, String::new()),
            };
            Some(Frame::Close { code, reason })
        }
        // Raw frames only appear in non-default codec configurations.
        Message::Frame(_) => None,
    }
}

#[async_trait]
impl FrameSource for GatewayStream {
    async fn next_frame(&mut self) -> Result<Option<Frame>, ClientError> {
        loop {
            match self.read.next().await {
                None => return Ok(None),
                Some(Err(tungstenite::Error::ConnectionClosed)) => return Ok(None),
                Some(Err(e)) => return Err(ClientError::Transport(e)),
                Some(Ok(msg)) => {
                    if let Some(frame) = frame_from_message(msg) {
                        return Ok(Some(frame));
                    }
                }
            }
        }
    }
}

#[async_trait]
impl FrameSink for GatewaySink {
    async fn send_text(&mut self, text: String) -> Result<(), ClientError> {
        self.write
            .send(Message::Text(text.into()))
            .await
            .map_err(ClientError::from)
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), ClientError> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        match self.write.send(Message::Close(Some(frame))).await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed)
            | Err(tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(ClientError::Transport(e)),
        }
    }
}
