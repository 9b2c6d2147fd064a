//! Streaming normalizer.
//!
//! Consumes the irregular event stream of an execution engine (token deltas,
//! generation-end markers, node lifecycle events, custom signals) and
//! publishes a clean sequence of [`OutputEvent`]s: text messages and action
//! executions, each with a strict start / content* / end lifecycle, plus
//! `RunError` for recovered failures.

use serde::{Deserialize, Serialize};

use relay_core::config::StreamConfig;

pub mod dispatch;
pub mod handlers;
pub mod runtime;
pub mod sink;
pub mod state;

pub use relay_core::protocol::OutputEvent;
pub use runtime::{process, process_messages, run_stream};
pub use sink::{ChannelSink, EventSink, SinkItem};
pub use state::{RunStateTable, StreamState, UnitInProgress, UnitKind};

/// The event kinds the normalizer acts on. Everything else is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    TokenDelta,
    GenerationEnd,
    NodeEntry,
    Unrecognized,
}

/// Discriminant strings for each recognized event kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventKinds {
    pub token_delta: String,
    pub generation_end: String,
    pub node_entry: String,
}

impl Default for EventKinds {
    fn default() -> Self {
        let config = StreamConfig::default();
        Self {
            token_delta: config.token_event,
            generation_end: config.generation_end_event,
            node_entry: config.node_entry_event,
        }
    }
}

impl EventKinds {
    pub fn classify(&self, discriminant: &str) -> EventKind {
        if discriminant == self.token_delta {
            EventKind::TokenDelta
        } else if discriminant == self.generation_end {
            EventKind::GenerationEnd
        } else if discriminant == self.node_entry {
            EventKind::NodeEntry
        } else {
            EventKind::Unrecognized
        }
    }
}

/// Options for one invocation.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Pre-assigned run id; otherwise the first run id observed is adopted.
    pub run_id: Option<String>,
    /// Default when an event carries no `copilotkit:emit-messages` flag.
    pub emit_messages: bool,
    /// Default when an event carries no `copilotkit:emit-tool-calls` flag.
    pub emit_tool_calls: bool,
    pub kinds: EventKinds,
    /// Engine bookkeeping nodes, never tracked as the current node.
    pub reserved_nodes: Vec<String>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self::from(&StreamConfig::default())
    }
}

impl From<&StreamConfig> for StreamOptions {
    fn from(config: &StreamConfig) -> Self {
        Self {
            run_id: None,
            emit_messages: config.emit_messages,
            emit_tool_calls: config.emit_tool_calls,
            kinds: EventKinds {
                token_delta: config.token_event.clone(),
                generation_end: config.generation_end_event.clone(),
                node_entry: config.node_entry_event.clone(),
            },
            reserved_nodes: config.reserved_nodes.clone(),
        }
    }
}

impl StreamOptions {
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn is_reserved_node(&self, name: &str) -> bool {
        self.reserved_nodes.iter().any(|n| n == name)
    }
}

/// Result of a completed invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOutcome {
    /// The canonical run id, echoed back to the caller.
    pub run_id: String,
    /// Whether any `RunError` was published.
    pub has_error: bool,
    pub events_seen: u64,
    /// Units still open when the source ended (cut-short streams).
    pub open_units: usize,
}
