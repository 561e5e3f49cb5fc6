pub mod events;
pub mod frames;
pub mod heartbeat;
pub mod session;
pub mod transport;

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::ClientError;
use crate::rest::RestClient;
use events::{close_code, GatewayEvent, GatewayEventKind, IdentifyCommand};
use frames::{FrameSource, Inbound};
use heartbeat::{send_heartbeat, HeartbeatScheduler, SharedSink};
use session::SessionState;
use transport::GatewayTransport;

/// Why the connection went away, as reported to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Disconnect {
    /// Clean close; the session must not be resumed.
    Clean(u16),
    /// The session may be resumed (resume itself is not implemented here).
    Resumable(Option<u16>),
    /// Socket-level failure.
    Error(String),
    /// Caller-initiated shutdown.
    Cancelled,
}

struct ConnectionHandles {
    cancel: CancellationToken,
    sink: SharedSink,
    heartbeat: Arc<HeartbeatScheduler>,
    receive_task: JoinHandle<()>,
}

/// Gateway connection orchestrator: discovers the endpoint, opens the
/// socket, runs the receive loop and owns the heartbeat scheduler.
/// Pass-through dispatch events arrive on the channel returned by `new`.
pub struct GatewayClient {
    config: Config,
    rest: RestClient,
    session: Arc<SessionState>,
    shutdown: CancellationToken,
    conn: Arc<Mutex<Option<ConnectionHandles>>>,
    // Serializes connect() calls so two callers cannot both pass the
    // AlreadyConnected check and race to install handles.
    connect_gate: tokio::sync::Mutex<()>,
    events_tx: mpsc::UnboundedSender<GatewayEvent>,
    disconnect_tx: Arc<watch::Sender<Option<Disconnect>>>,
}

impl GatewayClient {
    pub fn new(
        config: Config,
        shutdown: CancellationToken,
    ) -> Result<(Self, mpsc::UnboundedReceiver<GatewayEvent>), ClientError> {
        let rest = RestClient::new(
            config.api_url.clone(),
            config.token.clone(),
            config.connect_timeout,
        )?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (disconnect_tx, _) = watch::channel(None);

        let client = Self {
            config,
            rest,
            session: Arc::new(SessionState::new()),
            shutdown,
            conn: Arc::new(Mutex::new(None)),
            connect_gate: tokio::sync::Mutex::new(()),
            events_tx,
            disconnect_tx: Arc::new(disconnect_tx),
        };
        Ok((client, events_rx))
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn is_connected(&self) -> bool {
        self.conn.lock().unwrap().is_some()
    }

    /// Discover the gateway endpoint (cached after the first call), open
    /// the socket and start the receive loop. Returns once the socket is
    /// open; the identify/ready handshake completes in the background.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let _gate = self.connect_gate.lock().await;
        if self.is_connected() {
            return Err(ClientError::AlreadyConnected);
        }
        let cancel = self.shutdown.child_token();

        let url = match self.session.gateway_url() {
            Some(url) => url,
            None => {
                let url = tokio::select! {
                    _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                    res = self.rest.get_gateway() => res?,
                };
                self.session.set_gateway_url(url.clone());
                tracing::info!(%url, "discovered gateway endpoint");
                url
            }
        };

        let transport = tokio::select! {
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            res = GatewayTransport::connect(&url, self.config.connect_timeout) => res?,
        };
        tracing::info!(%url, "connected to gateway");

        let (sink_half, stream) = transport.split();
        let sink: SharedSink = Arc::new(tokio::sync::Mutex::new(
            Box::new(sink_half) as Box<dyn frames::FrameSink>,
        ));
        let heartbeat = HeartbeatScheduler::new(Arc::clone(&self.session), Arc::clone(&sink));

        self.disconnect_tx.send_replace(None);

        // Install the handles under the same lock the receive loop clears
        // on exit, so even an instantly-dying connection cannot leave
        // stale handles behind.
        let mut slot = self.conn.lock().unwrap();
        let receive_task = tokio::spawn(receive_loop(
            stream,
            Arc::clone(&sink),
            Arc::clone(&self.session),
            Arc::clone(&heartbeat),
            self.events_tx.clone(),
            Arc::clone(&self.disconnect_tx),
            Arc::clone(&self.conn),
            cancel.clone(),
            self.config.token.clone(),
            self.config.intents,
        ));

        *slot = Some(ConnectionHandles {
            cancel,
            sink,
            heartbeat,
            receive_task,
        });
        Ok(())
    }

    /// Resolves when the current connection terminates, with the reason.
    pub async fn closed(&self) -> Disconnect {
        let mut rx = self.disconnect_tx.subscribe();
        loop {
            if let Some(reason) = rx.borrow_and_update().clone() {
                return reason;
            }
            if rx.changed().await.is_err() {
                return Disconnect::Error("client dropped".to_string());
            }
        }
    }

    /// Cancel both loops, close the transport and clear heartbeat timers.
    /// Session identity is retained; call `reset_session` to wipe it.
    pub async fn disconnect(&self) {
        let handles = self.conn.lock().unwrap().take();
        let Some(handles) = handles else {
            return;
        };

        handles.cancel.cancel();
        handles.heartbeat.stop();
        {
            let mut sink = handles.sink.lock().await;
            if let Err(e) = sink.close(close_code::NORMAL, "client disconnect").await {
                tracing::debug!("close frame on disconnect failed: {e}");
            }
        }
        if handles.receive_task.await.is_err() {
            tracing::warn!("receive task aborted abnormally");
        }
        self.session.clear_heartbeat_clock();
        tracing::info!("disconnected");
    }

    pub fn reset_session(&self) {
        self.session.reset();
    }
}

#[allow(clippy::too_many_arguments)]
async fn receive_loop<S: FrameSource + 'static>(
    mut stream: S,
    sink: SharedSink,
    session: Arc<SessionState>,
    heartbeat: Arc<HeartbeatScheduler>,
    events_tx: mpsc::UnboundedSender<GatewayEvent>,
    disconnect_tx: Arc<watch::Sender<Option<Disconnect>>>,
    conn: Arc<Mutex<Option<ConnectionHandles>>>,
    cancel: CancellationToken,
    token: String,
    intents: u64,
) {
    let reason = loop {
        let inbound = tokio::select! {
            _ = cancel.cancelled() => break Disconnect::Cancelled,
            // A dead peer never echoes our heartbeat-timeout close, so the
            // scheduler's own signal has to end the loop.
            _ = heartbeat.timed_out() => {
                break Disconnect::Resumable(Some(close_code::HEARTBEAT_TIMEOUT));
            }
            res = frames::next_message(&mut stream) => res,
        };

        let inbound = match inbound {
            Ok(Some(inbound)) => inbound,
            Ok(None) => {
                break Disconnect::Error("stream ended without a close frame".to_string());
            }
            Err(ClientError::Protocol(msg)) => {
                tracing::warn!("dropping malformed message: {msg}");
                continue;
            }
            Err(e) => {
                tracing::error!("transport error: {e}");
                break Disconnect::Error(e.to_string());
            }
        };

        match inbound {
            Inbound::Closed { code, reason } => {
                tracing::info!(?code, %reason, "gateway closed the connection");
                break match code {
                    Some(code) if !close_code::is_resumable(code) => Disconnect::Clean(code),
                    other => Disconnect::Resumable(other),
                };
            }
            Inbound::Message(text) => {
                let event = match events::decode(&text) {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!("dropping undecodable message: {e}");
                        continue;
                    }
                };

                if let Some(sequence) = event.sequence {
                    session.record_sequence(sequence);
                }

                match event.kind {
                    GatewayEventKind::Hello(hello) => {
                        tracing::info!(
                            interval_ms = hello.heartbeat_interval,
                            "received HELLO"
                        );
                        heartbeat.start(hello.heartbeat_interval, &cancel);

                        let identify = IdentifyCommand::new(&token, intents);
                        let sent = match events::encode(&identify) {
                            Ok(text) => sink.lock().await.send_text(text).await,
                            Err(e) => Err(e),
                        };
                        if let Err(e) = sent {
                            tracing::error!("failed to send IDENTIFY: {e}");
                            break Disconnect::Error(e.to_string());
                        }
                        tracing::debug!("IDENTIFY sent");
                    }
                    GatewayEventKind::HeartbeatAck => {
                        session.record_heartbeat_ack();
                        tracing::trace!("heartbeat acknowledged");
                    }
                    GatewayEventKind::HeartbeatRequest => {
                        tracing::debug!("server requested an immediate heartbeat");
                        if let Err(e) = send_heartbeat(&sink, &session).await {
                            tracing::warn!("out-of-band heartbeat failed: {e}");
                        }
                    }
                    GatewayEventKind::Ready(ready) => {
                        tracing::info!(
                            session_id = %ready.session_id,
                            version = ready.version,
                            "session ready"
                        );
                        session.set_ready(ready.session_id, ready.resume_gateway_url);
                    }
                    GatewayEventKind::Unknown { op, event_type, data } => {
                        let _ = events_tx.send(GatewayEvent {
                            sequence: event.sequence,
                            kind: GatewayEventKind::Unknown {
                                op,
                                event_type,
                                data,
                            },
                        });
                    }
                }
            }
        }
    };

    heartbeat.stop();
    session.clear_heartbeat_clock();
    if matches!(reason, Disconnect::Clean(_)) {
        session.reset();
    }
    // Free the connection slot before publishing, so callers woken by
    // closed() observe is_connected() == false and may reconnect at once.
    drop(conn.lock().unwrap().take());

    tracing::info!(?reason, "receive loop terminated");
    // send_replace stores the reason even when no closed() caller is
    // subscribed yet; a plain send would discard it.
    disconnect_tx.send_replace(Some(reason));
}
