use std::sync::Mutex;

use tokio::time::Instant;

#[derive(Debug, Default)]
struct Identity {
    gateway_url: Option<String>,
    last_sequence: Option<u64>,
    session_id: Option<String>,
    resume_gateway_url: Option<String>,
}

#[derive(Debug, Default)]
struct HeartbeatClock {
    last_sent_at: Option<Instant>,
    last_ack_at: Option<Instant>,
}

/// Mutable session record shared between the receive loop and the
/// heartbeat loop. Identity fields are written only by the receive path;
/// the heartbeat clock pair sits behind its own lock because the ack
/// comparison reads both timestamps together.
#[derive(Debug, Default)]
pub struct SessionState {
    identity: Mutex<Identity>,
    clock: Mutex<HeartbeatClock>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gateway_url(&self) -> Option<String> {
        self.identity.lock().unwrap().gateway_url.clone()
    }

    pub fn set_gateway_url(&self, url: String) {
        self.identity.lock().unwrap().gateway_url = Some(url);
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.identity.lock().unwrap().last_sequence
    }

    pub fn record_sequence(&self, sequence: u64) {
        self.identity.lock().unwrap().last_sequence = Some(sequence);
    }

    pub fn session_id(&self) -> Option<String> {
        self.identity.lock().unwrap().session_id.clone()
    }

    pub fn resume_gateway_url(&self) -> Option<String> {
        self.identity.lock().unwrap().resume_gateway_url.clone()
    }

    pub fn set_ready(&self, session_id: String, resume_gateway_url: String) {
        let mut identity = self.identity.lock().unwrap();
        identity.session_id = Some(session_id);
        identity.resume_gateway_url = Some(resume_gateway_url);
    }

    pub fn record_heartbeat_sent(&self) {
        self.clock.lock().unwrap().last_sent_at = Some(Instant::now());
    }

    pub fn record_heartbeat_ack(&self) {
        self.clock.lock().unwrap().last_ack_at = Some(Instant::now());
    }

    /// True when a heartbeat has been sent and no ack has arrived since.
    pub fn heartbeat_outstanding(&self) -> bool {
        let clock = self.clock.lock().unwrap();
        match (clock.last_sent_at, clock.last_ack_at) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(sent), Some(ack)) => ack < sent,
        }
    }

    /// Drop the in-memory heartbeat timers. Called on every disconnect;
    /// session identity survives for a future resume component.
    pub fn clear_heartbeat_clock(&self) {
        let mut clock = self.clock.lock().unwrap();
        clock.last_sent_at = None;
        clock.last_ack_at = None;
    }

    /// Wipe everything except the cached gateway URL. Used after a clean,
    /// non-resumable close.
    pub fn reset(&self) {
        let mut identity = self.identity.lock().unwrap();
        identity.last_sequence = None;
        identity.session_id = None;
        identity.resume_gateway_url = None;
        drop(identity);
        self.clear_heartbeat_clock();
    }
}
