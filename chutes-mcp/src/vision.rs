use base64::Engine;
use bytes::Bytes;
use serde_json::{json, Value};

use crate::error::Result;
use crate::http::{completion_text, Capability, ChutesClient};

pub const DEFAULT_ANALYSIS_PROMPT: &str = "Describe this image in detail.";

/// An image handed to the vision model.
#[derive(Debug, Clone)]
pub enum ImageInput {
    /// Raw image bytes, sent inline as a JPEG data URI.
    Bytes(Bytes),
    /// An `http(s)` URL or a `data:image/...` URI, passed through as is.
    Reference(String),
}

impl ImageInput {
    fn to_url(&self) -> Option<String> {
        match self {
            ImageInput::Bytes(data) => Some(format!(
                "data:image/jpeg;base64,{}",
                base64::engine::general_purpose::STANDARD.encode(data)
            )),
            ImageInput::Reference(s) if s.starts_with("http") || s.starts_with("data:image") => {
                Some(s.clone())
            }
            ImageInput::Reference(_) => None,
        }
    }
}

/// Asks the multimodal chat model about images.
#[derive(Clone)]
pub struct VisionClient {
    client: ChutesClient,
}

impl VisionClient {
    pub fn new(client: ChutesClient) -> Self {
        Self { client }
    }

    pub async fn ask(&self, prompt: &str, images: &[ImageInput]) -> Result<String> {
        let body = self.request_body(prompt, images);
        let response = self.client.post_json(Capability::Llm, &body).await?;
        let answer = completion_text(&response)?;
        tracing::info!("Multimodal LLM request successful");
        Ok(answer)
    }

    fn request_body(&self, prompt: &str, images: &[ImageInput]) -> Value {
        let mut content = vec![json!({ "type": "text", "text": prompt })];
        for image in images {
            match image.to_url() {
                Some(url) => content.push(json!({ "type": "image_url", "image_url": { "url": url } })),
                None => tracing::warn!("Unsupported image reference, skipping it"),
            }
        }

        json!({
            "model": self.client.settings().get_str("chutes.models.vision_llm"),
            "messages": [{ "role": "user", "content": content }],
            "stream": false,
            "temperature": 0.7,
            "max_tokens": 1024,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::error::ToolError;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn vision(settings: Value) -> VisionClient {
        VisionClient::new(ChutesClient::new(
            Arc::new(Settings::from_value(settings)),
            reqwest::Client::new(),
        ))
    }

    #[test]
    fn test_request_body_filters_images() {
        let client = vision(json!({ "chutes": { "models": { "vision_llm": "vl-model" } } }));
        let body = client.request_body(
            "What is this?",
            &[
                ImageInput::Bytes(Bytes::from_static(b"abc")),
                ImageInput::Reference("https://img.example/cat.png".to_string()),
                ImageInput::Reference("/tmp/cat.png".to_string()),
            ],
        );
        assert_eq!(body["model"], "vl-model");
        assert_eq!(body["stream"], false);
        let content = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(content.len(), 3);
        assert_eq!(content[0]["text"], "What is this?");
        assert_eq!(content[1]["image_url"]["url"], "data:image/jpeg;base64,YWJj");
        assert_eq!(content[2]["image_url"]["url"], "https://img.example/cat.png");
    }

    #[tokio::test]
    async fn test_ask_extracts_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "A red fox." } }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/empty/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let client = vision(json!({ "chutes": {
            "api_token": "t",
            "base_url": format!("{}/v1", server.uri())
        }}));
        let answer = client
            .ask("Describe", &[ImageInput::Bytes(Bytes::from_static(b"img"))])
            .await
            .unwrap();
        assert_eq!(answer, "A red fox.");

        let client = vision(json!({ "chutes": {
            "api_token": "t",
            "base_url": format!("{}/empty", server.uri())
        }}));
        let err = client.ask("Describe", &[]).await.unwrap_err();
        assert!(matches!(err, ToolError::Parse(_)));
    }
}
