//! Execution engine sources.
//!
//! Each source implements the [`EngineSource`] trait: given an
//! [`EngineInput`], it starts a run on the execution engine and returns the
//! raw [`EngineEvent`] stream that the normalizer consumes.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use relay_core::types::EngineEvent;

pub mod http;
pub mod input;
pub mod replay;
pub mod sse;

pub use http::HttpEngineSource;
pub use input::{HostMessage, convert_messages};
pub use replay::ReplaySource;

/// Raw engine event stream. An `Err` item means the stream itself failed.
pub type EventStream = Pin<Box<dyn Stream<Item = anyhow::Result<EngineEvent>> + Send>>;

/// Input for one engine run, already converted to the engine's format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assistant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    pub messages: Vec<serde_json::Value>,
    /// Additional graph state forwarded untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<serde_json::Value>,
}

impl EngineInput {
    /// Convert host messages into engine input.
    pub fn from_messages(messages: &[HostMessage]) -> relay_core::error::Result<Self> {
        Ok(Self {
            messages: convert_messages(messages)?,
            ..Self::default()
        })
    }
}

/// The execution engine collaborator.
#[async_trait]
pub trait EngineSource: Send + Sync {
    /// Source identifier (e.g., "http", "replay").
    fn id(&self) -> &str;

    /// Start a run and return its event stream.
    async fn open(&self, input: &EngineInput) -> anyhow::Result<EventStream>;
}
