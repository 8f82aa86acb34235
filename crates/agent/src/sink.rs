//! The producing side of a run's event queue.

use spindle_core::AgentEvent;
use tokio::sync::mpsc;
use tracing::debug;

/// Event queue capacity per run.
pub const EVENT_QUEUE_CAPACITY: usize = 16;

/// Sends events to the caller of a run.
///
/// The queue is bounded: when the caller falls behind, `emit` waits for a
/// free slot, which suspends the run. If the caller has dropped its receiver
/// the event is discarded and the run carries on to completion.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<AgentEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<AgentEvent>) -> Self {
        Self { tx }
    }

    /// A sink plus the receiver the caller drains.
    pub fn channel() -> (Self, mpsc::Receiver<AgentEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        (Self::new(tx), rx)
    }

    pub async fn emit(&self, event: AgentEvent) {
        let event_type = event.event_type();
        if self.tx.send(event).await.is_err() {
            debug!(event_type, "Event receiver dropped, discarding event");
        }
    }
}
