//! Unit lifecycle handlers, one per recognized event kind.
//!
//! Handlers read and update the run state table and publish zero or more
//! events. Payloads are decoded before any state changes, so a handler that
//! fails leaves the table untouched.

use tracing::{debug, trace};

use relay_core::content::renderable_text;
use relay_core::error::Result;
use relay_core::protocol::OutputEvent;
use relay_core::types::{EngineEvent, ToolCallChunk};

use crate::sink::EventSink;
use crate::state::{StreamState, UnitInProgress, UnitKind};
use crate::StreamOptions;

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Token-delta events: open units on first content and stream text or
/// argument fragments into them.
pub fn handle_token_delta(
    event: &EngineEvent,
    sink: &dyn EventSink,
    state: &mut StreamState,
    options: &StreamOptions,
) -> Result<()> {
    let chunk = event.chunk()?;

    // Closing is driven by the generation-end event.
    if let Some(reason) = chunk.finish_reason() {
        trace!(reason, "Completion marker on delta");
        return Ok(());
    }

    let run = state.run_key(event.run_id.as_deref());
    let emit_messages = event.emit_messages().unwrap_or(options.emit_messages);
    let emit_tool_calls = event.emit_tool_calls().unwrap_or(options.emit_tool_calls);

    if emit_tool_calls {
        if let Some(call) = chunk.tool_call() {
            if let Some(name) = call.name() {
                if starts_new_call(state.units.get(&run), call) {
                    let unit = UnitInProgress::tool_call(
                        chunk.id.clone().unwrap_or_else(new_id),
                        call.id.clone().filter(|id| !id.is_empty()).unwrap_or_else(new_id),
                        name,
                    );
                    let call_id = unit.call_id().unwrap_or_default().to_string();
                    open_unit(&run, unit, sink, state);
                    if let Some(args) = call.args_text() {
                        sink.emit(OutputEvent::ActionExecutionArgs {
                            action_execution_id: call_id,
                            args,
                        });
                    }
                    return Ok(());
                }
            }

            let open_call = state.units.get(&run).and_then(UnitInProgress::call_id);
            if let (Some(call_id), Some(args)) = (open_call, call.args_text()) {
                sink.emit(OutputEvent::ActionExecutionArgs {
                    action_execution_id: call_id.to_string(),
                    args,
                });
                return Ok(());
            }
        }
    }

    if !emit_messages {
        return Ok(());
    }
    let Some(text) = renderable_text(chunk.content.as_ref()) else {
        return Ok(());
    };

    let open_text = state
        .units
        .get(&run)
        .filter(|unit| unit.is_text())
        .map(|unit| unit.id.clone());
    let message_id = match open_text {
        Some(id) => id,
        None => {
            let unit = UnitInProgress::text(chunk.id.clone().unwrap_or_else(new_id));
            let id = unit.id.clone();
            open_unit(&run, unit, sink, state);
            id
        }
    };
    sink.emit(OutputEvent::TextMessageContent {
        message_id,
        content: text.to_string(),
    });
    Ok(())
}

/// A named descriptor starts a call unless that same call is already open.
fn starts_new_call(open: Option<&UnitInProgress>, call: &ToolCallChunk) -> bool {
    match open.map(|u| &u.kind) {
        None | Some(UnitKind::Text) => true,
        Some(UnitKind::ToolCall { call_id, .. }) => call
            .id
            .as_deref()
            .is_some_and(|id| !id.is_empty() && id != call_id),
    }
}

/// Open `unit` on `run`, ending whatever unit it supersedes first.
fn open_unit(run: &str, unit: UnitInProgress, sink: &dyn EventSink, state: &mut StreamState) {
    if let Some(previous) = state.units.close(run) {
        debug!(run, unit = %previous.id, "Unit superseded");
        sink.emit(previous.end_event());
    }
    debug!(run, unit = %unit.id, kind = ?unit.kind, "Unit opened");
    sink.emit(unit.start_event());
    state.units.open(run, unit);
}

/// Generation-end events: close the run's open unit, if any.
pub fn handle_generation_end(event: &EngineEvent, sink: &dyn EventSink, state: &mut StreamState) {
    let run = state.run_key(event.run_id.as_deref());
    match state.units.close(&run) {
        Some(unit) => {
            debug!(run, unit = %unit.id, "Unit closed");
            sink.emit(unit.end_event());
        }
        None => trace!(run, "Generation ended with no open unit"),
    }
}

/// Node-entry events: remember the most recent non-reserved node.
pub fn handle_node_entry(event: &EngineEvent, state: &mut StreamState, options: &StreamOptions) {
    if let Some(node) = event.node_name().filter(|n| !options.is_reserved_node(n)) {
        trace!(node, "Entered node");
        state.current_node_name = Some(node.to_string());
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::sink::{ChannelSink, SinkItem};

    fn drain(rx: &mut mpsc::UnboundedReceiver<SinkItem>) -> Vec<OutputEvent> {
        let mut events = Vec::new();
        while let Ok(SinkItem::Event(event)) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn delta(run: &str, chunk: serde_json::Value) -> EngineEvent {
        EngineEvent::new("on_chat_model_stream")
            .with_run_id(run)
            .with_chunk(chunk)
    }

    #[test]
    fn test_text_adopts_chunk_id() {
        let (sink, mut rx) = ChannelSink::channel();
        let mut state = StreamState::new(None);
        let options = StreamOptions::default();

        for text in ["a", "b"] {
            let event = delta("r1", json!({"id": "msg-1", "content": text}));
            handle_token_delta(&event, &sink, &mut state, &options).unwrap();
        }

        assert_eq!(
            drain(&mut rx),
            vec![
                OutputEvent::TextMessageStart { message_id: "msg-1".into() },
                OutputEvent::TextMessageContent { message_id: "msg-1".into(), content: "a".into() },
                OutputEvent::TextMessageContent { message_id: "msg-1".into(), content: "b".into() },
            ]
        );
    }

    #[test]
    fn test_empty_content_keeps_unit_open() {
        let (sink, mut rx) = ChannelSink::channel();
        let mut state = StreamState::new(None);
        let options = StreamOptions::default();

        for text in ["a", ""] {
            let event = delta("r1", json!({"content": text}));
            handle_token_delta(&event, &sink, &mut state, &options).unwrap();
        }

        assert_eq!(drain(&mut rx).len(), 2);
        assert!(state.units.get("r1").unwrap().is_text());
    }

    #[test]
    fn test_completion_marker_is_ignored() {
        let (sink, mut rx) = ChannelSink::channel();
        let mut state = StreamState::new(None);
        let options = StreamOptions::default();

        let chunk = json!({"content": "tail", "response_metadata": {"finish_reason": "stop"}});
        handle_token_delta(&delta("r1", chunk), &sink, &mut state, &options).unwrap();

        assert!(drain(&mut rx).is_empty());
        assert!(state.units.is_empty());
    }

    #[test]
    fn test_tool_call_start_generates_missing_ids() {
        let (sink, mut rx) = ChannelSink::channel();
        let mut state = StreamState::new(None);
        let options = StreamOptions::default();

        let chunk = json!({"tool_call_chunks": [{"name": "search", "args": ""}]});
        handle_token_delta(&delta("r1", chunk), &sink, &mut state, &options).unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            OutputEvent::ActionExecutionStart {
                action_execution_id,
                action_name,
                parent_message_id,
            } => {
                assert!(!action_execution_id.is_empty());
                assert_eq!(action_name, "search");
                assert!(parent_message_id.is_some());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_start_chunk_with_args_emits_both() {
        let (sink, mut rx) = ChannelSink::channel();
        let mut state = StreamState::new(None);
        let options = StreamOptions::default();

        let chunk = json!({
            "tool_call_chunks": [{"id": "call_1", "name": "search", "args": "{\"q\""}]
        });
        handle_token_delta(&delta("r1", chunk), &sink, &mut state, &options).unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            OutputEvent::ActionExecutionArgs {
                action_execution_id: "call_1".into(),
                args: "{\"q\"".into(),
            }
        );
    }

    #[test]
    fn test_text_then_tool_call_supersedes() {
        let (sink, mut rx) = ChannelSink::channel();
        let mut state = StreamState::new(None);
        let options = StreamOptions::default();

        let text = delta("r1", json!({"id": "m1", "content": "checking"}));
        handle_token_delta(&text, &sink, &mut state, &options).unwrap();
        let chunk = json!({"id": "m1", "tool_call_chunks": [{"id": "call_1", "name": "search"}]});
        handle_token_delta(&delta("r1", chunk), &sink, &mut state, &options).unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 4);
        assert_eq!(events[2], OutputEvent::TextMessageEnd { message_id: "m1".into() });
        assert!(matches!(events[3], OutputEvent::ActionExecutionStart { .. }));
        assert_eq!(state.units.get("r1").unwrap().call_id(), Some("call_1"));
    }

    #[test]
    fn test_second_call_id_supersedes_first() {
        let (sink, mut rx) = ChannelSink::channel();
        let mut state = StreamState::new(None);
        let options = StreamOptions::default();

        for chunk in [
            json!({"tool_call_chunks": [{"id": "call_1", "name": "search"}]}),
            json!({"tool_call_chunks": [{"id": "call_1", "name": "search", "args": "{}"}]}),
            json!({"tool_call_chunks": [{"id": "call_2", "name": "weather"}]}),
        ] {
            handle_token_delta(&delta("r1", chunk), &sink, &mut state, &options).unwrap();
        }

        let kinds: Vec<_> = drain(&mut rx).iter().map(OutputEvent::kind).collect();
        assert_eq!(
            kinds,
            vec![
                "ActionExecutionStart",
                "ActionExecutionArgs",
                "ActionExecutionEnd",
                "ActionExecutionStart",
            ]
        );
    }

    #[test]
    fn test_descriptor_without_name_or_args_is_ignored() {
        let (sink, mut rx) = ChannelSink::channel();
        let mut state = StreamState::new(None);
        let options = StreamOptions::default();

        let chunk = json!({"tool_call_chunks": [{"id": "call_1", "index": 0}]});
        handle_token_delta(&delta("r1", chunk), &sink, &mut state, &options).unwrap();

        assert!(drain(&mut rx).is_empty());
        assert!(state.units.is_empty());
    }

    #[test]
    fn test_event_metadata_overrides_options() {
        let (sink, mut rx) = ChannelSink::channel();
        let mut state = StreamState::new(None);
        let options = StreamOptions {
            emit_messages: false,
            ..StreamOptions::default()
        };

        let mut event = delta("r1", json!({"content": "hi"}));
        handle_token_delta(&event, &sink, &mut state, &options).unwrap();
        assert!(drain(&mut rx).is_empty());

        event.metadata = Some(relay_core::types::EventMetadata {
            emit_messages: Some(true),
            ..Default::default()
        });
        handle_token_delta(&event, &sink, &mut state, &options).unwrap();
        assert_eq!(drain(&mut rx).len(), 2);
    }

    #[test]
    fn test_generation_end_without_unit_is_noop() {
        let (sink, mut rx) = ChannelSink::channel();
        let mut state = StreamState::new(None);

        let end = EngineEvent::new("on_chat_model_end").with_run_id("r1");
        handle_generation_end(&end, &sink, &mut state);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_node_entry_skips_reserved() {
        let mut state = StreamState::new(None);
        let options = StreamOptions::default();

        let entry = EngineEvent::new("on_chain_start");
        handle_node_entry(&entry.clone().with_name("agent"), &mut state, &options);
        handle_node_entry(&entry.clone().with_name("__start__"), &mut state, &options);
        handle_node_entry(&entry, &mut state, &options);

        assert_eq!(state.current_node_name.as_deref(), Some("agent"));
    }
}
