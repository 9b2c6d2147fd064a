//! Stream driver: pulls engine events in order and feeds them to dispatch.

use std::time::Instant;

use futures::Stream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use relay_core::error::{RelayError, Result};
use relay_core::protocol::OutputEvent;
use relay_core::types::EngineEvent;
use relay_engine::{EngineInput, EngineSource, HostMessage};

use crate::dispatch::dispatch;
use crate::sink::EventSink;
use crate::state::StreamState;
use crate::{ProcessOutcome, StreamOptions};

/// Drive `source` to exhaustion, then complete the sink.
///
/// Events are handled strictly one at a time. A source failure is published
/// as a `RunError`, ends the stream and is returned after completion.
pub async fn run_stream<S>(
    mut source: S,
    sink: &dyn EventSink,
    state: &mut StreamState,
    options: &StreamOptions,
) -> Result<()>
where
    S: Stream<Item = anyhow::Result<EngineEvent>> + Unpin,
{
    let mut outcome = Ok(());

    while let Some(item) = source.next().await {
        match item {
            Ok(event) => {
                state.record_event();
                dispatch(&event, sink, state, options);
            }
            Err(e) => {
                let err = RelayError::SourceStream(format!("{e:#}"));
                error!(run_id = state.run_id(), error = %err, "Engine stream failed");
                state.mark_error();
                sink.emit(OutputEvent::run_error(err.to_run_error()));
                outcome = Err(err);
                break;
            }
        }
    }

    sink.complete();
    outcome
}

/// Open `source` for `input` and normalize its events into `sink`.
///
/// The sink is completed exactly once whether the invocation succeeds or
/// not. Failing to open the source publishes nothing before completion.
pub async fn process(
    source: &dyn EngineSource,
    input: &EngineInput,
    sink: &dyn EventSink,
    options: StreamOptions,
) -> Result<ProcessOutcome> {
    let start = Instant::now();
    let mut state = StreamState::new(options.run_id.clone());

    let stream = match source.open(input).await {
        Ok(stream) => stream,
        Err(e) => {
            error!(source = source.id(), error = %e, "Failed to open engine stream");
            sink.complete();
            return Err(RelayError::Engine(format!("{e:#}")));
        }
    };
    info!(source = source.id(), messages = input.messages.len(), "Stream opened");

    run_stream(stream, sink, &mut state, &options).await?;

    let open_units = state.units.len();
    if open_units > 0 {
        warn!(run_id = state.run_id(), open_units, "Stream ended with units still open");
    }
    if let Some(node) = &state.current_node_name {
        debug!(node = %node, "Last node entered");
    }

    let outcome = ProcessOutcome {
        run_id: state.run_id().to_string(),
        has_error: state.has_error(),
        events_seen: state.events_seen(),
        open_units,
    };
    info!(
        run_id = %outcome.run_id,
        events = outcome.events_seen,
        has_error = outcome.has_error,
        duration_ms = start.elapsed().as_millis() as u64,
        "Stream complete"
    );
    Ok(outcome)
}

/// Convert host-side messages into engine input, then [`process`] them.
pub async fn process_messages(
    source: &dyn EngineSource,
    messages: &[HostMessage],
    sink: &dyn EventSink,
    options: StreamOptions,
) -> Result<ProcessOutcome> {
    let input = match EngineInput::from_messages(messages) {
        Ok(input) => input,
        Err(e) => {
            error!(error = %e, "Input conversion failed");
            sink.complete();
            return Err(e);
        }
    };
    process(source, &input, sink, options).await
}
