//! Retry with exponential backoff.
//!
//! Attempt 0 is the first try. A failure is retried only while it classifies
//! as transient and the budget lasts; the wait between attempts races the
//! run's interruption signals.

use std::future::Future;
use std::time::Duration;

use spindle_config::RetryConfig;
use spindle_core::{AgentError, Classify, FailureKind, RunSignals};
use tracing::{debug, info, warn};

/// Failure text markers treated as transient when an error carries no
/// structural classification. Matched case-insensitively.
const TRANSIENT_MARKERS: [&str; 7] = [
    "timeout",
    "connection refused",
    "temporary failure",
    "rate limit",
    "429",
    "503",
    "context deadline exceeded",
];

/// Immutable retry settings, shared read-only across tool calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
}

impl RetryPolicy {
    pub fn new(
        max_retries: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
        multiplier: f64,
    ) -> Self {
        Self {
            max_retries,
            initial_backoff,
            max_backoff,
            multiplier,
        }
    }

    /// A policy that executes every operation exactly once.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn initial_backoff(&self) -> Duration {
        self.initial_backoff
    }

    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn is_enabled(&self) -> bool {
        self.max_retries > 0
    }

    /// The wait that follows `current`: `min(current × multiplier, max_backoff)`.
    pub fn next_backoff(&self, current: Duration) -> Duration {
        Duration::try_from_secs_f64(current.as_secs_f64() * self.multiplier)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            config.initial_backoff(),
            config.max_backoff(),
            config.multiplier,
        )
    }
}

/// Whether `err` is worth another attempt.
///
/// The error's own classification wins; unclassified errors fall back to
/// [`looks_transient`] on their display text.
pub fn is_retriable<E: Classify + ?Sized>(err: &E) -> bool {
    match err.failure_kind() {
        Some(FailureKind::Transient) => true,
        Some(FailureKind::Permanent) => false,
        None => looks_transient(&err.to_string()),
    }
}

/// Substring heuristic over failure text.
pub fn looks_transient(text: &str) -> bool {
    let lowered = text.to_lowercase();
    TRANSIENT_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Why a retried operation gave up.
#[derive(Debug, Clone)]
pub enum RetryError<E> {
    /// The last failure of the operation itself.
    Failed(E),
    /// The run was cancelled or stopped while waiting to retry.
    Interrupted(AgentError),
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(err) => err.fmt(f),
            Self::Interrupted(err) => err.fmt(f),
        }
    }
}

/// Outcome of [`retry_with_backoff`] plus the number of retries it took.
#[derive(Debug)]
pub struct Retried<T, E> {
    pub result: Result<T, RetryError<E>>,
    pub retries: u32,
}

/// Run `operation` under `policy`.
///
/// Each failed attempt is classified with [`is_retriable`]. Between attempts
/// the task sleeps for the current backoff unless `signals` fire first, in
/// which case the interruption is reported instead of the prior failure.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    signals: &RunSignals,
    mut operation: F,
) -> Retried<T, E>
where
    E: Classify,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    // The first wait is capped like every later one.
    let mut backoff = policy.initial_backoff.min(policy.max_backoff);
    let mut attempt = 0u32;

    loop {
        let err = match operation().await {
            Ok(value) => {
                return Retried {
                    result: Ok(value),
                    retries: attempt,
                };
            }
            Err(err) => err,
        };

        if !is_retriable(&err) {
            debug!(attempt, error = %err, "Error not retriable");
            return Retried {
                result: Err(RetryError::Failed(err)),
                retries: attempt,
            };
        }

        if attempt >= policy.max_retries {
            warn!(max_retries = policy.max_retries, error = %err, "Max retries reached");
            return Retried {
                result: Err(RetryError::Failed(err)),
                retries: attempt,
            };
        }

        info!(
            attempt = attempt + 1,
            backoff_ms = backoff.as_millis() as u64,
            error = %err,
            "Retrying after backoff"
        );

        tokio::select! {
            biased;
            interrupted = signals.interrupted() => {
                return Retried {
                    result: Err(RetryError::Interrupted(interrupted)),
                    retries: attempt,
                };
            }
            _ = tokio::time::sleep(backoff) => {
                backoff = policy.next_backoff(backoff);
            }
        }

        attempt += 1;
    }
}
