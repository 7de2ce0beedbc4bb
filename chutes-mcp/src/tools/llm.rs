use std::sync::Arc;

use chutes_mcp_core::{
    context::ToolContext,
    tool_text_content,
    tools::ToolHandlerFn,
    types::{Tool, ToolResponseContent},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{check_min, Result};
use crate::http::{completion_text, Capability, ChutesClient};
use crate::stream::decode_chat_stream;
use crate::AppState;

use super::{handler, tool};

pub const DEFAULT_LLM_MODEL: &str = "deepseek-ai/DeepSeek-R1-0528";

/// One turn of the conversation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ChatMessage {
    /// `system`, `user` or `assistant`.
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ChatParams {
    /// A list of messages in the conversation.
    pub messages: Vec<ChatMessage>,
    /// The model to use for the completion. Defaults to the configured LLM model.
    #[serde(default)]
    pub model: Option<String>,
    /// The sampling temperature for the completion.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// The maximum number of tokens to generate.
    #[serde(default = "default_max_tokens")]
    #[schemars(range(min = 1))]
    pub max_tokens: u32,
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

impl ChatParams {
    fn validate(&self) -> Result<()> {
        check_min("max_tokens", self.max_tokens, 1)
    }

    fn resolve_model(&self, client: &ChutesClient) -> String {
        self.model
            .clone()
            .filter(|model| !model.is_empty())
            .or_else(|| client.model(Capability::Llm))
            .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string())
    }

    fn request_body(&self, client: &ChutesClient, stream: bool) -> Value {
        json!({
            "model": self.resolve_model(client),
            "messages": self.messages,
            "stream": stream,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        })
    }
}

pub(crate) fn tools(state: &Arc<AppState>) -> Vec<(Tool, ToolHandlerFn)> {
    vec![
        (
            tool::<ChatParams>(
                "chutes_chat",
                "Sends a prompt to a Chutes LLM and gets a single response. Use this for non-streaming applications.",
                None,
            ),
            handler(state, "chutes_chat", chat),
        ),
        (
            tool::<ChatParams>(
                "chutes_chat_stream",
                "Sends a prompt to a Chutes LLM and gets a streaming response. Use this for real-time applications.",
                None,
            ),
            handler(state, "chutes_chat_stream", chat_stream),
        ),
    ]
}

pub async fn chat(
    state: Arc<AppState>,
    params: ChatParams,
    ctx: ToolContext,
) -> Result<Vec<ToolResponseContent>> {
    params.validate()?;
    let body = params.request_body(&state.client, false);
    tracing::debug!(
        "Chat parameters: model={}, temperature={}, max_tokens={}",
        body["model"],
        params.temperature,
        params.max_tokens
    );

    let response = state.client.post_json(Capability::Llm, &body).await?;
    let text = completion_text(&response)?;
    ctx.info("Chat completion received").await;
    Ok(vec![tool_text_content!(text)])
}

/// Same request as `chat` with `stream: true`; the deltas are concatenated
/// and returned as one text block. Each delta is reported as progress.
pub async fn chat_stream(
    state: Arc<AppState>,
    params: ChatParams,
    ctx: ToolContext,
) -> Result<Vec<ToolResponseContent>> {
    params.validate()?;
    let body = params.request_body(&state.client, true);
    tracing::debug!(
        "Stream chat parameters: model={}, temperature={}, max_tokens={}",
        body["model"],
        params.temperature,
        params.max_tokens
    );

    let response = state.client.post_stream(Capability::Llm, &body).await?;
    let text = decode_chat_stream(response.bytes_stream(), &ctx).await?;
    ctx.info(format!("Stream chat finished with {} characters", text.chars().count()))
        .await;
    Ok(vec![tool_text_content!(text)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    fn client(settings: Value) -> ChutesClient {
        ChutesClient::new(Arc::new(Settings::from_value(settings)), reqwest::Client::new())
    }

    fn params(model: Option<&str>) -> ChatParams {
        serde_json::from_value(json!({
            "messages": [{ "role": "user", "content": "hi" }],
            "model": model,
        }))
        .unwrap()
    }

    #[test]
    fn test_defaults_and_model_resolution() {
        let defaults = params(None);
        assert_eq!(defaults.temperature, 0.7);
        assert_eq!(defaults.max_tokens, 1024);

        let bare = client(json!({}));
        assert_eq!(defaults.resolve_model(&bare), DEFAULT_LLM_MODEL);

        let configured = client(json!({ "chutes": { "models": { "llm": "org/custom" } } }));
        assert_eq!(defaults.resolve_model(&configured), "org/custom");

        let explicit = params(Some("org/explicit"));
        assert_eq!(explicit.resolve_model(&configured), "org/explicit");
    }

    #[test]
    fn test_request_body() {
        let body = params(None).request_body(&client(json!({})), true);
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["max_tokens"], 1024);
    }

    #[test]
    fn test_zero_max_tokens_rejected() {
        let params: ChatParams = serde_json::from_value(json!({
            "messages": [],
            "max_tokens": 0
        }))
        .unwrap();
        assert!(params.validate().is_err());
    }
}
