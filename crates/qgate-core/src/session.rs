//! Per-connection gateway session state.
//!
//! [`GatewaySession`] is owned by exactly one gateway connection and only
//! mutated from its receive loop, so it needs no interior locking.

use crate::protocol::{self, Envelope};

/// Number of consecutive failed reconnects after which a resume is no longer
/// attempted and the next connect performs a fresh identify.
pub const MAX_RESUME_ATTEMPTS: u32 = 20;

/// Session bookkeeping for one shard.
#[derive(Debug, Clone)]
pub struct GatewaySession {
    session_id: Option<String>,
    last_sequence: Option<u64>,
    shard_index: u32,
    shard_total: u32,
    reconnect_attempts: u32,
    may_resume: bool,
    max_resume_attempts: u32,
}

impl GatewaySession {
    /// Creates a session for the given shard. The first connect identifies.
    pub fn new(shard_index: u32, shard_total: u32) -> Self {
        Self {
            session_id: None,
            last_sequence: None,
            shard_index,
            shard_total: shard_total.max(1),
            reconnect_attempts: 0,
            may_resume: false,
            max_resume_attempts: MAX_RESUME_ATTEMPTS,
        }
    }

    /// Overrides the resume attempt ceiling.
    pub fn with_max_resume_attempts(mut self, max: u32) -> Self {
        self.max_resume_attempts = max;
        self
    }

    /// Session id from the last READY, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Last sequence number seen on a dispatch frame.
    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    /// `(shard_index, shard_total)`.
    pub fn shard(&self) -> (u32, u32) {
        (self.shard_index, self.shard_total)
    }

    /// Consecutive disconnects since the last READY/RESUMED.
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Whether the next handshake will be a resume.
    pub fn may_resume(&self) -> bool {
        self.may_resume
    }

    /// Records a sequence number. Older numbers are ignored.
    ///
    /// Returns `true` if the stored sequence advanced.
    pub fn observe_sequence(&mut self, sequence: u64) -> bool {
        match self.last_sequence {
            Some(last) if sequence < last => false,
            _ => {
                self.last_sequence = Some(sequence);
                true
            }
        }
    }

    /// Called when a connect attempt starts.
    ///
    /// A fresh identify begins a new sequence space, so the old sequence and
    /// session id are dropped when no resume will be attempted.
    pub fn begin_attempt(&mut self) {
        if !self.may_resume {
            self.session_id = None;
            self.last_sequence = None;
        }
    }

    /// READY received: store the session and reset the reconnect counter.
    pub fn mark_ready(&mut self, session_id: impl Into<String>) {
        self.session_id = Some(session_id.into());
        self.reconnect_attempts = 0;
    }

    /// RESUMED received: reset the reconnect counter.
    pub fn mark_resumed(&mut self) {
        self.reconnect_attempts = 0;
    }

    /// The channel dropped while not stopping.
    pub fn record_disconnect(&mut self) {
        self.may_resume = true;
        self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
    }

    /// Decides between resume and identify for the next attempt.
    ///
    /// Resume needs a session id and fewer than the maximum consecutive
    /// failed attempts.
    pub fn prepare_reconnect(&mut self) {
        self.may_resume =
            self.session_id.is_some() && self.reconnect_attempts < self.max_resume_attempts;
    }

    /// Builds the identify or resume frame, depending on [`may_resume`](Self::may_resume).
    pub fn handshake_frame(&self, token: &str, intents: u32) -> Envelope {
        match (&self.session_id, self.may_resume) {
            (Some(session_id), true) => protocol::resume(token, session_id, self.last_sequence),
            _ => protocol::identify(token, intents, self.shard_index, self.shard_total),
        }
    }
}
