//! Externally settable stop flag shared by every component of a bot.

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Cloneable stop signal.
///
/// Gateway receive loops check it after every inbound frame; reconnect
/// delays wake up as soon as it is set.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    token: CancellationToken,
}

impl StopHandle {
    /// Creates an unset handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a stop. Idempotent.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Whether a stop was requested.
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes once a stop is requested.
    pub fn stopped(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// A token that is cancelled together with this handle.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }
}
