use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RelayError, Result};

/// Metadata key that suppresses text message output when `false`.
pub const EMIT_MESSAGES_KEY: &str = "copilotkit:emit-messages";

/// Metadata key that suppresses action execution output when `false`.
pub const EMIT_TOOL_CALLS_KEY: &str = "copilotkit:emit-tool-calls";

/// One raw event from the execution engine's stream.
///
/// `data` is kept as raw JSON; handlers decode the part they need so that a
/// malformed payload fails only the handler that touches it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineEvent {
    pub event: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EventMetadata>,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl EngineEvent {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            ..Self::default()
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Attach a token-delta chunk as `data.chunk`.
    pub fn with_chunk(mut self, chunk: Value) -> Self {
        self.data = serde_json::json!({ "chunk": chunk });
        self
    }

    /// Per-event text suppression flag, if the engine set one.
    pub fn emit_messages(&self) -> Option<bool> {
        self.metadata.as_ref().and_then(|m| m.emit_messages)
    }

    /// Per-event action suppression flag, if the engine set one.
    pub fn emit_tool_calls(&self) -> Option<bool> {
        self.metadata.as_ref().and_then(|m| m.emit_tool_calls)
    }

    /// Node this event belongs to: the event name, else the node recorded in metadata.
    pub fn node_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .or_else(|| self.metadata.as_ref()?.langgraph_node.as_deref())
            .filter(|n| !n.is_empty())
    }

    /// Decode the token-delta chunk at `data.chunk`.
    pub fn chunk(&self) -> Result<MessageChunk> {
        let raw = self
            .data
            .get("chunk")
            .filter(|c| !c.is_null())
            .ok_or_else(|| {
                RelayError::MalformedEvent(format!("'{}' event carries no chunk", self.event))
            })?;
        serde_json::from_value(raw.clone()).map_err(|e| {
            RelayError::MalformedEvent(format!("'{}' chunk could not be decoded: {e}", self.event))
        })
    }
}

/// Engine-supplied metadata attached to an event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventMetadata {
    #[serde(
        rename = "copilotkit:emit-messages",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub emit_messages: Option<bool>,

    #[serde(
        rename = "copilotkit:emit-tool-calls",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub emit_tool_calls: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub langgraph_node: Option<String>,

    /// Everything else the engine attaches; carried but not interpreted.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// An incremental fragment of model output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageChunk {
    /// Message id assigned by the engine, adopted for the output unit when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_chunks: Option<Vec<ToolCallChunk>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_metadata: Option<ResponseMetadata>,
}

impl MessageChunk {
    /// The tool-call descriptor carried by this chunk (first entry only).
    pub fn tool_call(&self) -> Option<&ToolCallChunk> {
        self.tool_call_chunks.as_deref().and_then(|c| c.first())
    }

    /// Completion marker: the reason generation stopped, on the final chunk.
    pub fn finish_reason(&self) -> Option<&str> {
        self.response_metadata.as_ref()?.finish_reason.as_deref()
    }
}

/// Tool-call descriptor streamed inside a chunk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolCallChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// A string fragment of JSON arguments, or an already-parsed value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

impl ToolCallChunk {
    /// Tool name, when present and non-empty.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.is_empty())
    }

    /// Argument payload rendered as text. String fragments pass through,
    /// other JSON values are serialized. Empty fragments count as absent.
    pub fn args_text(&self) -> Option<String> {
        match self.args.as_ref()? {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Polymorphic message content: a plain string, a list of typed blocks, or
/// something else entirely (kept so that decoding never fails on shape alone).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
    Other(Value),
}

/// One element of a block list. Only `text` blocks carry renderable text;
/// any element that is not a well-formed text block is kept as raw JSON so
/// one odd element never hides the rest of the list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentBlock {
    Text(TextBlock),
    Other(Value),
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(TextBlock {
            kind: TextBlockKind::Text,
            text: text.into(),
        })
    }
}

/// `{"type": "text", "text": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    #[serde(rename = "type")]
    pub kind: TextBlockKind,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextBlockKind {
    #[serde(rename = "text")]
    Text,
}
