//! Cancelable delayed transitions.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Fired,
    Canceled,
}

/// Waits out a delay unless the token is canceled first.
#[derive(Debug, Clone)]
pub struct ScheduledTransition {
    delay: Duration,
    token: CancellationToken,
}

impl ScheduledTransition {
    pub fn new(delay: Duration, token: CancellationToken) -> Self {
        Self { delay, token }
    }

    pub async fn wait(self) -> TransitionOutcome {
        if self.token.is_cancelled() {
            return TransitionOutcome::Canceled;
        }
        tokio::select! {
            biased;
            _ = self.token.cancelled() => TransitionOutcome::Canceled,
            _ = tokio::time::sleep(self.delay) => TransitionOutcome::Fired,
        }
    }
}
