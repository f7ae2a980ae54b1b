//! Periodic liveness signal for a gateway connection.
//!
//! The interval comes from the hello frame; the task is started on READY or
//! RESUMED and cancelled on every disconnect.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, trace, warn};

use qgate_core::Scheduler;
use qgate_core::protocol::{self, Envelope};

/// Shortest accepted heartbeat period.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Last sequence number, shared between the receive loop and the heartbeat.
pub type SharedSequence = Arc<Mutex<Option<u64>>>;

struct ActiveTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns at most one heartbeat task.
pub struct HeartbeatScheduler {
    scheduler: Scheduler,
    sequence: SharedSequence,
    interval: Option<Duration>,
    active: Option<ActiveTask>,
}

impl HeartbeatScheduler {
    /// Creates an idle scheduler that will read sequence numbers from
    /// `sequence`.
    pub fn new(scheduler: Scheduler, sequence: SharedSequence) -> Self {
        Self {
            scheduler,
            sequence,
            interval: None,
            active: None,
        }
    }

    /// Heartbeat period, once a hello frame was seen.
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Sets the heartbeat period from a hello frame's millisecond interval.
    ///
    /// Intervals below [`MIN_INTERVAL`] are raised to it.
    pub fn set_interval_ms(&mut self, interval_ms: u64) {
        let requested = Duration::from_millis(interval_ms);
        if requested < MIN_INTERVAL {
            warn!(
                interval_ms,
                min_ms = MIN_INTERVAL.as_millis() as u64,
                "Heartbeat interval too short, clamping"
            );
        }
        self.interval = Some(requested.max(MIN_INTERVAL));
    }

    /// Whether a heartbeat task is running.
    pub fn is_active(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Starts the heartbeat task sending into `outbound`.
    ///
    /// A no-op returning `false` when a task is already running or no
    /// interval is known yet.
    pub fn start(&mut self, outbound: mpsc::Sender<Envelope>) -> bool {
        if self.is_active() {
            trace!("Heartbeat already running");
            return false;
        }
        let Some(interval) = self.interval else {
            debug!("Heartbeat not started, no interval received yet");
            return false;
        };

        let token = CancellationToken::new();
        let handle = self.scheduler.spawn(run_heartbeat(
            interval,
            Arc::clone(&self.sequence),
            outbound,
            token.clone(),
        )
        .in_current_span());
        self.active = Some(ActiveTask { token, handle });
        debug!(interval_ms = interval.as_millis() as u64, "Heartbeat started");
        true
    }

    /// Stops the heartbeat task. No frame is sent after this returns.
    pub fn cancel(&mut self) {
        if let Some(task) = self.active.take() {
            task.token.cancel();
            task.handle.abort();
            debug!("Heartbeat cancelled");
        }
    }
}

impl Drop for HeartbeatScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn run_heartbeat(
    interval: Duration,
    sequence: SharedSequence,
    outbound: mpsc::Sender<Envelope>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            () = tokio::time::sleep(interval) => {}
        }
        if token.is_cancelled() || outbound.is_closed() {
            return;
        }

        let seq = *sequence.lock();
        trace!(seq = ?seq, "Sending heartbeat");
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            sent = outbound.send(protocol::heartbeat(seq)) => {
                if sent.is_err() {
                    return;
                }
            }
        }
    }
}
