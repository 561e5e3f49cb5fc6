use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::ClientError;
use crate::gateway::events::{close_code, encode, HeartbeatCommand};
use crate::gateway::frames::FrameSink;
use crate::gateway::session::SessionState;

/// Transport write half, shared between the receive loop and the
/// heartbeat loop. The mutex doubles as the exclusive send permit.
pub type SharedSink = Arc<tokio::sync::Mutex<Box<dyn FrameSink>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatStatus {
    Idle,
    Running,
    Stopped,
}

struct RunHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Periodic heartbeat loop. Sends `HeartbeatCommand`s at the
/// server-dictated interval (plus jitter) and closes the socket when the
/// previous heartbeat was never acknowledged.
pub struct HeartbeatScheduler {
    session: Arc<SessionState>,
    sink: SharedSink,
    status: Mutex<HeartbeatStatus>,
    run: Mutex<Option<RunHandle>>,
    // Bumped on every start; a run only writes its terminal status while
    // its epoch is still current, so a stale epilogue cannot clobber a
    // restarted run.
    epoch: AtomicU64,
    timeout: CancellationToken,
}

impl HeartbeatScheduler {
    pub fn new(session: Arc<SessionState>, sink: SharedSink) -> Arc<Self> {
        Arc::new(Self {
            session,
            sink,
            status: Mutex::new(HeartbeatStatus::Idle),
            run: Mutex::new(None),
            epoch: AtomicU64::new(0),
            timeout: CancellationToken::new(),
        })
    }

    pub fn status(&self) -> HeartbeatStatus {
        *self.status.lock().unwrap()
    }

    /// Resolves once the loop has given up on an unacknowledged heartbeat.
    /// The orchestrator selects on this to tear the connection down even
    /// when the peer is too dead to echo the close frame.
    pub async fn timed_out(&self) {
        self.timeout.cancelled().await;
    }

    /// Begin heartbeating at `interval_ms`. No-op while already running;
    /// restartable from Idle or Stopped.
    pub fn start(self: &Arc<Self>, interval_ms: u64, parent: &CancellationToken) {
        let epoch = {
            let mut status = self.status.lock().unwrap();
            if *status == HeartbeatStatus::Running {
                tracing::debug!("heartbeat scheduler already running");
                return;
            }
            *status = HeartbeatStatus::Running;
            self.epoch.fetch_add(1, Ordering::SeqCst) + 1
        };

        let cancel = parent.child_token();
        let scheduler = Arc::clone(self);
        let loop_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            scheduler.run_loop(interval_ms.max(1), loop_cancel).await;
            let mut status = scheduler.status.lock().unwrap();
            if scheduler.epoch.load(Ordering::SeqCst) == epoch {
                *status = HeartbeatStatus::Stopped;
            }
        });

        *self.run.lock().unwrap() = Some(RunHandle { cancel, task });
        tracing::debug!(interval_ms, "heartbeat scheduler started");
    }

    async fn run_loop(&self, interval_ms: u64, cancel: CancellationToken) {
        loop {
            let delay = Duration::from_millis(interval_ms + jitter_ms(interval_ms));
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            if self.session.heartbeat_outstanding() {
                tracing::warn!("heartbeat was not acknowledged, closing connection");
                let mut sink = self.sink.lock().await;
                if let Err(e) = sink
                    .close(close_code::HEARTBEAT_TIMEOUT, "heartbeat timeout")
                    .await
                {
                    tracing::warn!("failed to send heartbeat-timeout close: {e}");
                }
                self.timeout.cancel();
                break;
            }

            if let Err(e) = send_heartbeat(&self.sink, &self.session).await {
                tracing::warn!("heartbeat send failed: {e}");
                break;
            }
        }
    }

    /// Cancel the repeating loop. Idempotent from any state.
    pub fn stop(&self) {
        *self.status.lock().unwrap() = HeartbeatStatus::Stopped;
        if let Some(run) = self.run.lock().unwrap().take() {
            run.cancel.cancel();
            drop(run.task);
            tracing::debug!("heartbeat scheduler stopped");
        }
    }
}

/// Send a single heartbeat carrying the last known sequence number and
/// stamp the send time. Also used by the orchestrator for out-of-band
/// heartbeats requested by the server.
pub async fn send_heartbeat(
    sink: &SharedSink,
    session: &SessionState,
) -> Result<(), ClientError> {
    let sequence = session.last_sequence();
    let text = encode(&HeartbeatCommand::new(sequence))?;
    sink.lock().await.send_text(text).await?;
    session.record_heartbeat_sent();
    tracing::debug!(?sequence, "heartbeat sent");
    Ok(())
}

/// Uniform jitter in `0..=interval/10`, so it can never exceed the
/// interval itself.
fn jitter_ms(interval_ms: u64) -> u64 {
    rand::thread_rng().gen_range(0..=interval_ms / 10)
}
