//! HTTP engine source.
//!
//! POSTs the run input to a streaming endpoint and reads the response body as
//! Server-Sent Events, one engine event per `data` payload.

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, error};

use relay_core::config::EngineConfig;

use crate::sse::{engine_events, parse_sse_stream};
use crate::{EngineInput, EngineSource, EventStream};

pub struct HttpEngineSource {
    pub url: String,
    api_key: Option<String>,
    assistant_id: Option<String>,
    client: reqwest::Client,
}

impl HttpEngineSource {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            api_key: None,
            assistant_id: None,
            client: reqwest::Client::new(),
        }
    }

    /// Build from config; `None` when no URL is configured.
    pub fn from_config(config: &EngineConfig) -> Option<Self> {
        let url = config.url.as_deref().filter(|u| !u.is_empty())?;
        let mut source = Self::new(url);
        source.api_key = config.resolve_api_key();
        source.assistant_id = config.assistant_id.clone();
        Some(source)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Request body for a run: the input plus event-level streaming.
    fn request_body(&self, input: &EngineInput) -> serde_json::Value {
        let mut input_state = input.state.clone().unwrap_or_else(|| json!({}));
        if let Some(obj) = input_state.as_object_mut() {
            obj.insert("messages".into(), json!(input.messages));
        }
        json!({
            "assistant_id": input.assistant_id.as_ref().or(self.assistant_id.as_ref()),
            "thread_id": input.thread_id,
            "input": input_state,
            "stream_mode": "events",
        })
    }
}

#[async_trait]
impl EngineSource for HttpEngineSource {
    fn id(&self) -> &str {
        "http"
    }

    async fn open(&self, input: &EngineInput) -> anyhow::Result<EventStream> {
        debug!(url = %self.url, messages = input.messages.len(), "Opening engine stream");

        let mut request = self
            .client
            .post(&self.url)
            .header("accept", "text/event-stream")
            .json(&self.request_body(input));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, "Engine rejected run");
            anyhow::bail!("Engine returned {status}: {body}");
        }

        Ok(Box::pin(engine_events(parse_sse_stream(
            response.bytes_stream(),
        ))))
    }
}
