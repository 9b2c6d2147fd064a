//! Normalized output protocol.
//!
//! Every activity observed in an engine stream is re-emitted as one of the
//! [`OutputEvent`] variants below. A text message or an action execution is a
//! *unit*: one start event, zero or more content/args events, one end event.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A normalized lifecycle event published to a sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum OutputEvent {
    TextMessageStart {
        message_id: String,
    },

    TextMessageContent {
        message_id: String,
        content: String,
    },

    TextMessageEnd {
        message_id: String,
    },

    ActionExecutionStart {
        action_execution_id: String,
        action_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        parent_message_id: Option<String>,
    },

    /// One argument fragment, exactly as streamed by the engine.
    ActionExecutionArgs {
        action_execution_id: String,
        args: String,
    },

    ActionExecutionEnd {
        action_execution_id: String,
    },

    RunError {
        message: String,
        code: ErrorCode,
    },
}

impl OutputEvent {
    pub fn run_error(info: RunErrorInfo) -> Self {
        OutputEvent::RunError {
            message: info.message,
            code: info.code,
        }
    }

    /// Wire name of the event, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            OutputEvent::TextMessageStart { .. } => "TextMessageStart",
            OutputEvent::TextMessageContent { .. } => "TextMessageContent",
            OutputEvent::TextMessageEnd { .. } => "TextMessageEnd",
            OutputEvent::ActionExecutionStart { .. } => "ActionExecutionStart",
            OutputEvent::ActionExecutionArgs { .. } => "ActionExecutionArgs",
            OutputEvent::ActionExecutionEnd { .. } => "ActionExecutionEnd",
            OutputEvent::RunError { .. } => "RunError",
        }
    }
}

/// Machine-readable error classification carried by `RunError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Reported for [`RelayError::Handler`](crate::error::RelayError::Handler).
    HandlerError,
    SourceStreamError,
    InputConversionError,
    MalformedEvent,
    InternalError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::HandlerError => "HANDLER_ERROR",
            ErrorCode::SourceStreamError => "SOURCE_STREAM_ERROR",
            ErrorCode::InputConversionError => "INPUT_CONVERSION_ERROR",
            ErrorCode::MalformedEvent => "MALFORMED_EVENT",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        };
        f.write_str(s)
    }
}

/// Normalized error descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunErrorInfo {
    pub message: String,
    pub code: ErrorCode,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_event_wire_shape() {
        let event = OutputEvent::TextMessageContent {
            message_id: "msg-1".into(),
            content: "hi".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({"type": "TextMessageContent", "messageId": "msg-1", "content": "hi"})
        );
    }

    #[test]
    fn test_action_start_omits_missing_parent() {
        let event = OutputEvent::ActionExecutionStart {
            action_execution_id: "call_1".into(),
            action_name: "search".into(),
            parent_message_id: None,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "ActionExecutionStart");
        assert_eq!(value["actionExecutionId"], "call_1");
        assert_eq!(value["actionName"], "search");
        assert!(value.get("parentMessageId").is_none());
    }

    #[test]
    fn test_run_error_code_serialization() {
        let event = OutputEvent::run_error(RunErrorInfo {
            message: "boom".into(),
            code: ErrorCode::HandlerError,
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["code"], "HANDLER_ERROR");
        assert_eq!(ErrorCode::HandlerError.to_string(), "HANDLER_ERROR");
        assert_eq!(event.kind(), "RunError");
    }
}
