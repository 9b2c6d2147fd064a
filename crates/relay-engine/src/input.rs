//! Convert host messages into the engine's message format.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use relay_core::error::{RelayError, Result};

/// A message as the host application represents it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    Text {
        id: String,
        role: String,
        content: String,
    },
    ActionExecution {
        id: String,
        name: String,
        /// JSON object, or a string holding serialized JSON.
        #[serde(default)]
        arguments: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_message_id: Option<String>,
    },
    Result {
        id: String,
        action_execution_id: String,
        action_name: String,
        result: String,
    },
}

/// Convert host messages to engine messages.
///
/// Action executions sharing a parent with the preceding assistant message
/// are folded into that message's `tool_calls`.
pub fn convert_messages(messages: &[HostMessage]) -> Result<Vec<Value>> {
    let mut out: Vec<Value> = Vec::with_capacity(messages.len());
    let mut known_calls: HashSet<&str> = HashSet::new();

    for message in messages {
        match message {
            HostMessage::Text { id, role, content } => {
                let kind = match role.as_str() {
                    "user" => "human",
                    "assistant" => "ai",
                    "system" => "system",
                    other => {
                        return Err(RelayError::InputConversion(format!(
                            "message {id} has unsupported role '{other}'"
                        )));
                    }
                };
                out.push(json!({ "id": id, "type": kind, "content": content }));
            }
            HostMessage::ActionExecution {
                id,
                name,
                arguments,
                parent_message_id,
            } => {
                let tool_call = json!({
                    "id": id,
                    "name": name,
                    "args": parse_arguments(id, arguments)?,
                });
                known_calls.insert(id.as_str());

                let parent = parent_message_id.as_deref().unwrap_or(id);
                let folds = out
                    .last()
                    .is_some_and(|last| last["type"] == "ai" && last["id"] == parent);
                match out.last_mut() {
                    Some(last) if folds => append_tool_call(last, tool_call),
                    _ => out.push(json!({
                        "id": parent,
                        "type": "ai",
                        "content": "",
                        "tool_calls": [tool_call],
                    })),
                }
            }
            HostMessage::Result {
                id,
                action_execution_id,
                action_name,
                result,
            } => {
                if !known_calls.contains(action_execution_id.as_str()) {
                    return Err(RelayError::InputConversion(format!(
                        "result {id} refers to unknown action execution {action_execution_id}"
                    )));
                }
                out.push(json!({
                    "id": id,
                    "type": "tool",
                    "content": result,
                    "tool_call_id": action_execution_id,
                    "name": action_name,
                }));
            }
        }
    }

    Ok(out)
}

fn parse_arguments(id: &str, arguments: &Value) -> Result<Value> {
    match arguments {
        Value::Null => Ok(json!({})),
        Value::String(s) if s.trim().is_empty() => Ok(json!({})),
        Value::String(s) => serde_json::from_str(s).map_err(|e| {
            RelayError::InputConversion(format!("action execution {id} has invalid arguments: {e}"))
        }),
        other => Ok(other.clone()),
    }
}

fn append_tool_call(message: &mut Value, tool_call: Value) {
    match message.get_mut("tool_calls").and_then(Value::as_array_mut) {
        Some(calls) => calls.push(tool_call),
        None => message["tool_calls"] = json!([tool_call]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(id: &str, role: &str, content: &str) -> HostMessage {
        HostMessage::Text {
            id: id.into(),
            role: role.into(),
            content: content.into(),
        }
    }

    #[test]
    fn test_text_roles() {
        let out = convert_messages(&[
            text("1", "system", "be brief"),
            text("2", "user", "hi"),
            text("3", "assistant", "hello"),
        ])
        .unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0]["type"], "system");
        assert_eq!(out[1]["type"], "human");
        assert_eq!(out[2]["type"], "ai");
        assert_eq!(out[2]["content"], "hello");
    }

    #[test]
    fn test_unsupported_role() {
        let err = convert_messages(&[text("1", "narrator", "once upon")]).unwrap_err();
        assert!(matches!(err, RelayError::InputConversion(_)));
    }

    #[test]
    fn test_actions_fold_into_parent_message() {
        let out = convert_messages(&[
            text("m1", "assistant", "let me look"),
            HostMessage::ActionExecution {
                id: "call_1".into(),
                name: "search".into(),
                arguments: json!("{\"query\":\"cats\"}"),
                parent_message_id: Some("m1".into()),
            },
            HostMessage::ActionExecution {
                id: "call_2".into(),
                name: "weather".into(),
                arguments: json!({"city": "Paris"}),
                parent_message_id: Some("m1".into()),
            },
            HostMessage::Result {
                id: "r1".into(),
                action_execution_id: "call_1".into(),
                action_name: "search".into(),
                result: "3 cats".into(),
            },
        ])
        .unwrap();

        assert_eq!(out.len(), 2);
        let calls = out[0]["tool_calls"].as_array().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0]["args"]["query"], "cats");
        assert_eq!(calls[1]["args"]["city"], "Paris");
        assert_eq!(out[1]["type"], "tool");
        assert_eq!(out[1]["tool_call_id"], "call_1");
    }

    #[test]
    fn test_orphan_action_gets_own_message() {
        let out = convert_messages(&[HostMessage::ActionExecution {
            id: "call_9".into(),
            name: "noop".into(),
            arguments: Value::Null,
            parent_message_id: None,
        }])
        .unwrap();
        assert_eq!(out[0]["id"], "call_9");
        assert_eq!(out[0]["tool_calls"][0]["args"], json!({}));
    }

    #[test]
    fn test_invalid_arguments_and_unknown_result() {
        let err = convert_messages(&[HostMessage::ActionExecution {
            id: "call_1".into(),
            name: "search".into(),
            arguments: json!("{not json"),
            parent_message_id: None,
        }])
        .unwrap_err();
        assert!(err.to_string().contains("invalid arguments"));

        let err = convert_messages(&[HostMessage::Result {
            id: "r1".into(),
            action_execution_id: "missing".into(),
            action_name: "search".into(),
            result: "x".into(),
        }])
        .unwrap_err();
        assert!(err.to_string().contains("unknown action execution"));
    }

    #[test]
    fn test_deserialize_host_messages() {
        let messages: Vec<HostMessage> = serde_json::from_value(json!([
            {"type": "text", "id": "1", "role": "user", "content": "hi"},
            {"type": "action_execution", "id": "c1", "name": "search", "arguments": {"q": 1}},
            {
                "type": "result",
                "id": "r1",
                "action_execution_id": "c1",
                "action_name": "search",
                "result": "ok"
            }
        ]))
        .unwrap();
        assert_eq!(messages.len(), 3);
        let input = crate::EngineInput::from_messages(&messages).unwrap();
        assert_eq!(input.messages.len(), 3);
    }
}
