//! Optional publishing of generated artifacts to ImageKit.
//!
//! Uploading is a side effect: a missing configuration or a failed upload is
//! logged and turns into "no URL", never into a failed tool call.

use std::io::Write;
use std::sync::Arc;

use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tempfile::NamedTempFile;
use thiserror::Error;
use uuid::Uuid;

use crate::config::Settings;

pub const DEFAULT_UPLOAD_ENDPOINT: &str = "https://upload.imagekit.io/api/v1/files/upload";
pub const DEFAULT_FOLDER: &str = "/Chutes/";

const PLACEHOLDERS: [(&str, &str); 3] = [
    ("imagekit.public_key", "your_public_key"),
    ("imagekit.private_key", "your_private_key"),
    ("imagekit.url_endpoint", "your_url_endpoint"),
];

const IMAGE_EXTENSIONS: [&str; 4] = ["jpeg", "jpg", "png", "webp"];

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("ImageKit is not configured")]
    NotConfigured,

    #[error("failed to stage upload payload: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode upload metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("ImageKit request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("ImageKit rejected the upload ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("ImageKit response carries no url")]
    MissingUrl,
}

/// Generation parameters attached to an upload. `None` values are dropped.
#[derive(Debug, Clone, Default)]
pub struct UploadMetadata {
    entries: Map<String, Value>,
}

impl UploadMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        match serde_json::to_value(value) {
            Ok(Value::Null) => {}
            Ok(value) => {
                self.entries.insert(key.to_string(), value);
            }
            Err(e) => tracing::debug!("Dropping metadata {}: {}", key, e),
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// ImageKit `customMetadata`: the whole record serialized into the single
    /// field `generation_parameters`.
    pub fn to_custom_metadata(&self) -> Result<Value, serde_json::Error> {
        let encoded = serde_json::to_string_pretty(&self.entries)?;
        Ok(json!({ "generation_parameters": encoded }))
    }
}

#[derive(Clone)]
pub struct ImageKitUploader {
    http: reqwest::Client,
    settings: Arc<Settings>,
}

impl ImageKitUploader {
    pub fn new(settings: Arc<Settings>, http: reqwest::Client) -> Self {
        Self { http, settings }
    }

    /// All three keys are set and none is still a sample placeholder.
    pub fn is_configured(&self) -> bool {
        PLACEHOLDERS.iter().all(|(key, placeholder)| {
            matches!(self.settings.get_str(key), Some(value) if value != *placeholder)
        })
    }

    fn endpoint(&self) -> String {
        self.settings
            .get_string_or("imagekit.upload_endpoint", DEFAULT_UPLOAD_ENDPOINT)
    }

    /// Uploads `data` and returns its public URL, or `None` on any failure.
    pub async fn upload(
        &self,
        data: &[u8],
        name_prefix: &str,
        metadata: &UploadMetadata,
        extension: &str,
    ) -> Option<String> {
        match self.try_upload(data, name_prefix, metadata, extension).await {
            Ok(url) => {
                tracing::info!("Uploaded {} to ImageKit: {}", name_prefix, url);
                Some(url)
            }
            Err(UploadError::NotConfigured) => {
                tracing::info!("ImageKit is not configured. Skipping upload.");
                None
            }
            Err(e) => {
                tracing::error!("Error uploading {} to ImageKit: {}", name_prefix, e);
                None
            }
        }
    }

    pub async fn try_upload(
        &self,
        data: &[u8],
        name_prefix: &str,
        metadata: &UploadMetadata,
        extension: &str,
    ) -> Result<String, UploadError> {
        if !self.is_configured() {
            return Err(UploadError::NotConfigured);
        }
        let private_key = self
            .settings
            .get_str("imagekit.private_key")
            .ok_or(UploadError::NotConfigured)?;

        let custom_metadata = metadata.to_custom_metadata()?;
        let file_name = format!("{}_{}.{}", name_prefix, Uuid::new_v4(), extension);

        // Staged on disk; the file is removed when `staged` drops.
        let mut staged = match self.settings.get_str("imagekit.staging_dir") {
            Some(dir) => NamedTempFile::new_in(dir)?,
            None => NamedTempFile::new()?,
        };
        staged.write_all(data)?;
        staged.flush()?;
        let payload = tokio::fs::read(staged.path()).await?;

        let mut form = Form::new()
            .part("file", Part::bytes(payload).file_name(file_name.clone()))
            .text("fileName", file_name.clone())
            .text("useUniqueFileName", "false")
            .text(
                "folder",
                self.settings.get_string_or("imagekit.folder", DEFAULT_FOLDER),
            )
            .text("tags", format!("chutes-mcp,ai-generated,{}", extension))
            .text("customMetadata", custom_metadata.to_string());

        let auto_tagging = self.settings.get_bool("imagekit.auto_tagging").unwrap_or(false);
        if auto_tagging && IMAGE_EXTENSIONS.contains(&extension) {
            let extensions = json!([
                { "name": "google-auto-tagging", "maxTags": 10, "minConfidence": 80 },
                { "name": "ai-auto-description" }
            ]);
            form = form.text("extensions", extensions.to_string());
        }

        tracing::debug!("Uploading {} ({} bytes) to ImageKit", file_name, data.len());
        let response = self
            .http
            .post(self.endpoint())
            .basic_auth(private_key, Some(""))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await?;
        body.get("url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(UploadError::MissingUrl)
    }
}
