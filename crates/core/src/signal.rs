//! Run interruption signals.
//!
//! A run can be interrupted two ways: the caller cancels its own token, or
//! the agent shuts down and fires its stop token. Both are cooperative; code
//! observes them at iteration boundaries and while waiting between retries.

use tokio_util::sync::CancellationToken;

use crate::error::AgentError;

/// The caller's cancellation token paired with the agent's stop token.
#[derive(Debug, Clone, Default)]
pub struct RunSignals {
    cancel: CancellationToken,
    stop: CancellationToken,
}

impl RunSignals {
    pub fn new(cancel: CancellationToken, stop: CancellationToken) -> Self {
        Self { cancel, stop }
    }

    /// `Err` with the matching error if either signal has fired.
    ///
    /// Caller cancellation wins when both fired.
    pub fn check(&self) -> Result<(), AgentError> {
        if self.cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        if self.stop.is_cancelled() {
            return Err(AgentError::Stopped);
        }
        Ok(())
    }

    pub fn is_interrupted(&self) -> bool {
        self.cancel.is_cancelled() || self.stop.is_cancelled()
    }

    /// Resolves once either signal fires, yielding the matching error.
    pub async fn interrupted(&self) -> AgentError {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => AgentError::Cancelled,
            _ = self.stop.cancelled() => AgentError::Stopped,
        }
    }

    /// The caller's cancellation token.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}
