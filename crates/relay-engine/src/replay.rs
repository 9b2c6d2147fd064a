//! Replay a captured engine event stream from JSON Lines.

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use relay_core::types::EngineEvent;

use crate::{EngineInput, EngineSource, EventStream};

/// Replays engine events recorded one JSON object per line.
///
/// Lines are decoded lazily as the stream is consumed, so an undecodable
/// line fails the stream at its position rather than up front.
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    lines: Vec<String>,
}

impl ReplaySource {
    /// Build from JSON Lines text. Blank lines are skipped.
    pub fn from_jsonl(text: &str) -> Self {
        Self {
            lines: text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub async fn from_path(path: &Path) -> anyhow::Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        Ok(Self::from_jsonl(&text))
    }

    pub fn from_events(events: &[EngineEvent]) -> anyhow::Result<Self> {
        let lines = events
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { lines })
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[async_trait]
impl EngineSource for ReplaySource {
    fn id(&self) -> &str {
        "replay"
    }

    async fn open(&self, _input: &EngineInput) -> anyhow::Result<EventStream> {
        debug!(events = self.lines.len(), "Opening replay stream");
        let lines = self.lines.clone();
        let stream = futures::stream::iter(lines.into_iter().enumerate().map(|(idx, line)| {
            serde_json::from_str::<EngineEvent>(&line)
                .map_err(|e| anyhow::anyhow!("Replay line {}: {e}", idx + 1))
        }));
        Ok(Box::pin(stream))
    }
}
