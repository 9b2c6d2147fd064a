//! Output sinks.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use relay_core::protocol::OutputEvent;

/// Destination for normalized events.
///
/// Writes are synchronous and fire-and-forget; buffering and backpressure
/// belong to the sink. `complete` is signalled once per invocation, last.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: OutputEvent);

    fn complete(&self);
}

/// What a [`ChannelSink`] receiver observes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkItem {
    Event(OutputEvent),
    Complete,
}

/// Sink backed by an unbounded tokio channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkItem>,
    completed: AtomicBool,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<SinkItem>) -> Self {
        Self {
            tx,
            completed: AtomicBool::new(false),
        }
    }

    /// Create a sink together with its receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SinkItem>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: OutputEvent) {
        if self.is_completed() {
            warn!(event = event.kind(), "Event after completion dropped");
            return;
        }
        if self.tx.send(SinkItem::Event(event)).is_err() {
            debug!("Sink receiver dropped");
        }
    }

    fn complete(&self) {
        if self.completed.swap(true, Ordering::SeqCst) {
            warn!("Sink already completed");
            return;
        }
        let _ = self.tx.send(SinkItem::Complete);
    }
}
