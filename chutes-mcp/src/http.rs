//! Outbound calls to the Chutes generation endpoints.
//!
//! Every call resolves its token and endpoint first, so a misconfigured
//! capability fails with `ToolError::Configuration` without touching the
//! network. No call is retried.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::{header, StatusCode};
use serde_json::Value;

use crate::config::Settings;
use crate::error::{Result, ToolError};

/// Timeout for health probes. Generation calls use the client default.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub const DEFAULT_QUOTA_URL: &str = "https://api.chutes.ai/users/me/quota_usage/0";

/// A generation endpoint family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Llm,
    TextToImage,
    TextToMusic,
    ImageToImage,
    TextToVideo,
    ImageToVideo,
    ImageToVideoFast,
}

impl Capability {
    /// All capabilities, in the order the health check reports them.
    pub const ALL: [Capability; 7] = [
        Capability::Llm,
        Capability::TextToImage,
        Capability::TextToMusic,
        Capability::ImageToImage,
        Capability::TextToVideo,
        Capability::ImageToVideo,
        Capability::ImageToVideoFast,
    ];

    /// Key under `chutes.endpoints` and `chutes.models`.
    pub fn key(self) -> &'static str {
        match self {
            Capability::Llm => "llm",
            Capability::TextToImage => "text_to_image",
            Capability::TextToMusic => "text_to_music",
            Capability::ImageToImage => "image_to_image",
            Capability::TextToVideo => "text_to_video",
            Capability::ImageToVideo => "image_to_video",
            Capability::ImageToVideoFast => "image_to_video_fast",
        }
    }

    /// Path appended to `chutes.base_url` when no explicit endpoint is set.
    fn sub_path(self) -> &'static str {
        match self {
            Capability::Llm => "chat/completions",
            Capability::TextToImage => "text-to-image",
            Capability::TextToMusic => "text-to-music",
            Capability::ImageToImage => "image-to-image",
            Capability::TextToVideo => "text-to-video",
            Capability::ImageToVideo => "image-to-video",
            Capability::ImageToVideoFast => "image-to-video-fast",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Capability::Llm => "LLM",
            Capability::TextToImage => "Text to Image",
            Capability::TextToMusic => "Text to Music",
            Capability::ImageToImage => "Image to Image",
            Capability::TextToVideo => "Text to Video",
            Capability::ImageToVideo => "Image to Video",
            Capability::ImageToVideoFast => "Image to Video Fast",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Client for the Chutes API. Clones share one connection pool.
#[derive(Clone)]
pub struct ChutesClient {
    http: reqwest::Client,
    settings: Arc<Settings>,
}

impl ChutesClient {
    pub fn new(settings: Arc<Settings>, http: reqwest::Client) -> Self {
        Self { http, settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn api_token(&self) -> Option<&str> {
        self.settings.get_str("chutes.api_token")
    }

    /// Configured endpoint, falling back to `chutes.base_url` + sub-path.
    pub fn endpoint(&self, capability: Capability) -> Option<String> {
        let key = format!("chutes.endpoints.{}", capability.key());
        if let Some(endpoint) = self.settings.get_str(&key) {
            return Some(endpoint.to_string());
        }
        self.settings.get_str("chutes.base_url").map(|base| {
            format!("{}/{}", base.trim_end_matches('/'), capability.sub_path())
        })
    }

    pub fn model(&self, capability: Capability) -> Option<String> {
        self.settings
            .get_str(&format!("chutes.models.{}", capability.key()))
            .map(str::to_string)
    }

    pub fn quota_url(&self) -> String {
        self.settings
            .get_string_or("chutes.endpoints.quota_usage", DEFAULT_QUOTA_URL)
    }

    /// Token and endpoint for `capability`.
    pub fn credentials(&self, capability: Capability) -> Result<(String, String)> {
        let token = self.api_token().ok_or_else(|| {
            tracing::warn!("CHUTES_API_TOKEN is not set for {}", capability);
            ToolError::Configuration("CHUTES_API_TOKEN is not set".to_string())
        })?;
        let endpoint = self.endpoint(capability).ok_or_else(|| {
            tracing::warn!("{} endpoint not configured", capability);
            ToolError::Configuration(format!("{} endpoint not configured", capability))
        })?;
        Ok((token.to_string(), endpoint))
    }

    async fn send(&self, capability: Capability, body: &Value) -> Result<reqwest::Response> {
        let (token, endpoint) = self.credentials(capability)?;
        tracing::info!("Calling Chutes {} API at {}", capability, endpoint);

        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(token)
            .header(header::CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| request_error(&endpoint, e))?;

        let status = response.status();
        tracing::debug!("{} responded with {}", endpoint, status);
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::error!("{} returned {}: {}", endpoint, status, text);
            return Err(ToolError::Transport(format!(
                "{} returned {}: {}",
                endpoint, status, text
            )));
        }
        Ok(response)
    }

    /// POSTs `body` and returns the raw response payload.
    pub async fn post_bytes(&self, capability: Capability, body: &Value) -> Result<Bytes> {
        let response = self.send(capability, body).await?;
        let url = response.url().to_string();
        response.bytes().await.map_err(|e| request_error(&url, e))
    }

    /// POSTs `body` and decodes the response as JSON.
    pub async fn post_json(&self, capability: Capability, body: &Value) -> Result<Value> {
        let bytes = self.post_bytes(capability, body).await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            tracing::error!(
                "Undecodable response from {}: {} - {}",
                capability,
                e,
                String::from_utf8_lossy(&bytes)
            );
            ToolError::Parse(e.to_string())
        })
    }

    /// POSTs `body` and hands back the live response for streaming.
    pub async fn post_stream(
        &self,
        capability: Capability,
        body: &Value,
    ) -> Result<reqwest::Response> {
        self.send(capability, body).await
    }

    /// Reachability probe: a GET with the bearer token and a short timeout.
    pub async fn probe(
        &self,
        url: &str,
        body: Option<&'static str>,
    ) -> std::result::Result<reqwest::Response, reqwest::Error> {
        let mut request = self
            .http
            .get(url)
            .timeout(PROBE_TIMEOUT)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = self.api_token() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.body(body);
        }
        request.send().await
    }
}

fn request_error(endpoint: &str, e: reqwest::Error) -> ToolError {
    tracing::error!("Request to {} failed: {}", endpoint, e);
    if e.is_builder() {
        ToolError::Unexpected(format!("{}: {}", endpoint, e))
    } else {
        ToolError::Transport(format!("{}: {}", endpoint, e))
    }
}

/// Text of the first choice of a chat completion.
pub fn completion_text(response: &Value) -> Result<String> {
    response
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            ToolError::Parse(format!(
                "missing choices[0].message.content in {}",
                response
            ))
        })
}

/// Whether a status means the health probe reached an authorized endpoint.
pub fn probe_reached(status: StatusCode) -> bool {
    status == StatusCode::BAD_REQUEST
}
