//! Per-invocation stream state and the run state table.

use std::collections::HashMap;

use relay_core::protocol::OutputEvent;

/// What an open unit is streaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitKind {
    Text,
    ToolCall { call_id: String, name: String },
}

/// A text message or action execution currently being streamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitInProgress {
    /// Message id; for tool calls, the id of the message that carries the call.
    pub id: String,
    pub kind: UnitKind,
}

impl UnitInProgress {
    pub fn text(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: UnitKind::Text,
        }
    }

    pub fn tool_call(
        id: impl Into<String>,
        call_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: UnitKind::ToolCall {
                call_id: call_id.into(),
                name: name.into(),
            },
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind, UnitKind::Text)
    }

    /// The call id, for tool-call units.
    pub fn call_id(&self) -> Option<&str> {
        match &self.kind {
            UnitKind::ToolCall { call_id, .. } => Some(call_id.as_str()),
            UnitKind::Text => None,
        }
    }

    pub fn start_event(&self) -> OutputEvent {
        match &self.kind {
            UnitKind::Text => OutputEvent::TextMessageStart {
                message_id: self.id.clone(),
            },
            UnitKind::ToolCall { call_id, name } => OutputEvent::ActionExecutionStart {
                action_execution_id: call_id.clone(),
                action_name: name.clone(),
                parent_message_id: Some(self.id.clone()),
            },
        }
    }

    pub fn end_event(&self) -> OutputEvent {
        match &self.kind {
            UnitKind::Text => OutputEvent::TextMessageEnd {
                message_id: self.id.clone(),
            },
            UnitKind::ToolCall { call_id, .. } => OutputEvent::ActionExecutionEnd {
                action_execution_id: call_id.clone(),
            },
        }
    }
}

/// Run id → the unit open on that run. An entry exists only while its unit is open.
#[derive(Debug, Default)]
pub struct RunStateTable {
    units: HashMap<String, UnitInProgress>,
}

impl RunStateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, run_id: &str) -> Option<&UnitInProgress> {
        self.units.get(run_id)
    }

    /// Record `unit` as open on `run_id`, returning whatever it replaced.
    pub fn open(&mut self, run_id: &str, unit: UnitInProgress) -> Option<UnitInProgress> {
        self.units.insert(run_id.to_string(), unit)
    }

    /// End the run's open unit, if any.
    pub fn close(&mut self, run_id: &str) -> Option<UnitInProgress> {
        self.units.remove(run_id)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// State for one invocation, exclusively owned by the stream driver.
#[derive(Debug)]
pub struct StreamState {
    run_id: Option<String>,
    /// Generated once per invocation; keys events that carry no run id.
    invocation_id: String,
    pub units: RunStateTable,
    pub current_node_name: Option<String>,
    has_error: bool,
    events_seen: u64,
}

impl StreamState {
    pub fn new(run_id: Option<String>) -> Self {
        Self {
            run_id: run_id.filter(|id| !id.is_empty()),
            invocation_id: uuid::Uuid::new_v4().to_string(),
            units: RunStateTable::new(),
            current_node_name: None,
            has_error: false,
            events_seen: 0,
        }
    }

    /// Adopt `run_id` as canonical unless one is already set.
    pub fn adopt_run_id(&mut self, run_id: Option<&str>) {
        if self.run_id.is_none() {
            if let Some(id) = run_id.filter(|id| !id.is_empty()) {
                self.run_id = Some(id.to_string());
            }
        }
    }

    /// Canonical run id: pre-assigned or adopted, else the invocation id.
    pub fn run_id(&self) -> &str {
        self.run_id.as_deref().unwrap_or(&self.invocation_id)
    }

    /// Table key for an event: its own run id, else the canonical one.
    pub fn run_key(&self, event_run_id: Option<&str>) -> String {
        event_run_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| self.run_id())
            .to_string()
    }

    /// Set the terminal error flag. It never clears.
    pub fn mark_error(&mut self) {
        self.has_error = true;
    }

    pub fn has_error(&self) -> bool {
        self.has_error
    }

    pub(crate) fn record_event(&mut self) {
        self.events_seen += 1;
    }

    pub fn events_seen(&self) -> u64 {
        self.events_seen
    }
}
