//! Routes engine events to their handler.

use tracing::{trace, warn};

use relay_core::protocol::OutputEvent;
use relay_core::types::EngineEvent;

use crate::handlers::{handle_generation_end, handle_node_entry, handle_token_delta};
use crate::sink::EventSink;
use crate::state::StreamState;
use crate::{EventKind, StreamOptions};

/// Handle one event. A failing handler is reported as a `RunError` and the
/// stream carries on; dispatch itself never fails.
pub fn dispatch(
    event: &EngineEvent,
    sink: &dyn EventSink,
    state: &mut StreamState,
    options: &StreamOptions,
) {
    state.adopt_run_id(event.run_id.as_deref());

    let result = match options.kinds.classify(&event.event) {
        EventKind::TokenDelta => handle_token_delta(event, sink, state, options),
        EventKind::GenerationEnd => {
            handle_generation_end(event, sink, state);
            Ok(())
        }
        EventKind::NodeEntry => {
            handle_node_entry(event, state, options);
            Ok(())
        }
        EventKind::Unrecognized => {
            trace!(event = %event.event, "Unrecognized event dropped");
            Ok(())
        }
    };

    if let Err(e) = result {
        warn!(event = %event.event, run_id = ?event.run_id, error = %e, "Handler failed");
        state.mark_error();
        sink.emit(OutputEvent::run_error(e.to_run_error()));
    }
}
