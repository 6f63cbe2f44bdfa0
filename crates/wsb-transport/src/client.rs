//! Per-client bookkeeping for the application endpoint.

use std::time::{Duration, Instant};

/// One connected application client.
#[derive(Debug)]
pub struct AppClient {
    /// Unique client ID
    pub id: String,
    /// When the client connected
    pub connected_at: Instant,
    /// Command frames received
    pub commands: u64,
    /// Event frames sent
    pub events: u64,
    /// Frames the endpoint ignored (binary)
    pub ignored: u64,
    /// Last time we received any frame from this client
    pub last_activity: Instant,
}

impl AppClient {
    pub fn new(id: String) -> Self {
        let now = Instant::now();
        Self {
            id,
            connected_at: now,
            commands: 0,
            events: 0,
            ignored: 0,
            last_activity: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn record_command(&mut self) {
        self.commands += 1;
        self.touch();
    }

    pub fn record_ignored(&mut self) {
        self.ignored += 1;
        self.touch();
    }

    pub fn record_event(&mut self) {
        self.events += 1;
    }

    pub fn uptime(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
