use std::sync::Arc;

use chutes_mcp_core::{
    context::ToolContext,
    tools::ToolHandlerFn,
    types::{Tool, ToolResponseContent},
};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::artifact::{GeneratedArtifact, MediaFormat};
use crate::error::{check_min, check_range, Result, ToolError};
use crate::http::Capability;
use crate::upload::UploadMetadata;
use crate::AppState;

use super::{default_true, describe, generation_hints, handler, publish, tool};

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GenerateImageParams {
    /// A text description of the desired image.
    pub prompt: String,
    /// A text description of what to avoid in the image.
    #[serde(default)]
    pub negative_prompt: Option<String>,
    /// The width of the generated image.
    #[serde(default = "default_dimension")]
    #[schemars(range(min = 1))]
    pub width: u32,
    /// The height of the generated image.
    #[serde(default = "default_dimension")]
    #[schemars(range(min = 1))]
    pub height: u32,
    /// The number of denoising steps.
    #[serde(default = "default_generate_steps")]
    #[schemars(range(min = 1, max = 100))]
    pub num_inference_steps: u32,
    /// A seed for reproducible generation.
    #[serde(default)]
    pub seed: Option<i64>,
    /// If true, uploads the image to ImageKit as a side effect.
    #[serde(default = "default_true")]
    pub save_to_file: bool,
    /// If true, describes the generated image with the vision model.
    #[serde(default)]
    pub analyze: bool,
    /// Question asked about the generated image when `analyze` is set.
    #[serde(default)]
    pub analysis_prompt: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct EditImageParams {
    /// A text description of the desired edit.
    pub prompt: String,
    /// Base64 encoded images to be edited.
    #[schemars(length(min = 1))]
    pub image_b64s: Vec<String>,
    /// A text description of what to avoid in the image.
    #[serde(default)]
    pub negative_prompt: Option<String>,
    /// The width of the edited image.
    #[serde(default = "default_dimension")]
    #[schemars(range(min = 1))]
    pub width: u32,
    /// The height of the edited image.
    #[serde(default = "default_dimension")]
    #[schemars(range(min = 1))]
    pub height: u32,
    /// The number of denoising steps.
    #[serde(default = "default_edit_steps")]
    #[schemars(range(min = 1, max = 100))]
    pub num_inference_steps: u32,
    /// A seed for reproducible generation.
    #[serde(default)]
    pub seed: Option<i64>,
    /// How closely the model should follow the prompt.
    #[serde(default = "default_true_cfg_scale")]
    #[schemars(range(min = 1.0, max = 20.0))]
    pub true_cfg_scale: f64,
    /// If true, uploads the image to ImageKit as a side effect.
    #[serde(default = "default_true")]
    pub save_to_file: bool,
    /// If true, describes the edited image with the vision model.
    #[serde(default)]
    pub analyze: bool,
    /// Question asked about the edited image when `analyze` is set.
    #[serde(default)]
    pub analysis_prompt: Option<String>,
}

fn default_dimension() -> u32 {
    1024
}

fn default_generate_steps() -> u32 {
    50
}

fn default_edit_steps() -> u32 {
    40
}

fn default_true_cfg_scale() -> f64 {
    4.0
}

impl GenerateImageParams {
    fn validate(&self) -> Result<()> {
        check_min("width", self.width, 1)?;
        check_min("height", self.height, 1)?;
        check_range("num_inference_steps", self.num_inference_steps, 1, 100)
    }

    fn negative_prompt(&self) -> &str {
        self.negative_prompt.as_deref().unwrap_or_default()
    }

    fn request_body(&self, model: Option<&str>) -> Value {
        json!({
            "model": model,
            "prompt": self.prompt,
            "negative_prompt": self.negative_prompt(),
            "width": self.width,
            "height": self.height,
            "num_inference_steps": self.num_inference_steps,
            "seed": self.seed,
        })
    }

    fn metadata(&self, model: Option<&str>) -> UploadMetadata {
        UploadMetadata::new()
            .with("model", model)
            .with("prompt", &self.prompt)
            .with("negative_prompt", self.negative_prompt())
            .with("width", self.width)
            .with("height", self.height)
            .with("num_inference_steps", self.num_inference_steps)
            .with("seed", self.seed)
    }
}

impl EditImageParams {
    fn validate(&self) -> Result<()> {
        if self.image_b64s.is_empty() {
            return Err(ToolError::InvalidArgument(
                "image_b64s must contain at least one image".to_string(),
            ));
        }
        check_min("width", self.width, 1)?;
        check_min("height", self.height, 1)?;
        check_range("num_inference_steps", self.num_inference_steps, 1, 100)?;
        check_range("true_cfg_scale", self.true_cfg_scale, 1.0, 20.0)
    }

    fn negative_prompt(&self) -> &str {
        self.negative_prompt.as_deref().unwrap_or_default()
    }

    // The edit endpoint picks its own model; the configured one is only
    // recorded in the upload metadata.
    fn request_body(&self) -> Value {
        json!({
            "prompt": self.prompt,
            "image_b64s": self.image_b64s,
            "negative_prompt": self.negative_prompt(),
            "width": self.width,
            "height": self.height,
            "num_inference_steps": self.num_inference_steps,
            "seed": self.seed,
            "true_cfg_scale": self.true_cfg_scale,
        })
    }

    fn metadata(&self, model: Option<&str>) -> UploadMetadata {
        UploadMetadata::new()
            .with("model", model)
            .with("prompt", &self.prompt)
            .with("negative_prompt", self.negative_prompt())
            .with("width", self.width)
            .with("height", self.height)
            .with("num_inference_steps", self.num_inference_steps)
            .with("seed", self.seed)
            .with("true_cfg_scale", self.true_cfg_scale)
    }
}

pub(crate) fn tools(state: &Arc<AppState>) -> Vec<(Tool, ToolHandlerFn)> {
    vec![
        (
            tool::<GenerateImageParams>(
                "generate_image",
                "Generates an image from a text prompt. By default, uploads the image to ImageKit as a side effect.",
                Some(generation_hints("Generate Image")),
            ),
            handler(state, "generate_image", generate_image),
        ),
        (
            tool::<EditImageParams>(
                "edit_image",
                "Edits an image based on a text prompt. By default, uploads the image to ImageKit as a side effect.",
                Some(generation_hints("Edit Image")),
            ),
            handler(state, "edit_image", edit_image),
        ),
    ]
}

pub async fn generate_image(
    state: Arc<AppState>,
    params: GenerateImageParams,
    ctx: ToolContext,
) -> Result<Vec<ToolResponseContent>> {
    params.validate()?;
    tracing::debug!("Generate image parameters: {:?}", params);

    let model = state.client.model(Capability::TextToImage);
    let body = params.request_body(model.as_deref());
    let data = state.client.post_bytes(Capability::TextToImage, &body).await?;
    ctx.info(format!("Received {} bytes of image data", data.len())).await;

    let artifact = publish(
        &state,
        &ctx,
        GeneratedArtifact::new(data, MediaFormat::Jpeg),
        params.save_to_file,
        "generated_image",
        params.metadata(model.as_deref()),
    )
    .await;
    finish(&state, &ctx, artifact, params.analyze, params.analysis_prompt.as_deref()).await
}

pub async fn edit_image(
    state: Arc<AppState>,
    params: EditImageParams,
    ctx: ToolContext,
) -> Result<Vec<ToolResponseContent>> {
    params.validate()?;
    tracing::debug!(
        "Edit image parameters: prompt='{}', images={}, width={}, height={}, steps={}, seed={:?}, true_cfg_scale={}",
        params.prompt,
        params.image_b64s.len(),
        params.width,
        params.height,
        params.num_inference_steps,
        params.seed,
        params.true_cfg_scale
    );

    let data = state
        .client
        .post_bytes(Capability::ImageToImage, &params.request_body())
        .await?;
    ctx.info(format!("Received {} bytes of edited image data", data.len())).await;

    let model = state.client.model(Capability::ImageToImage);
    let artifact = publish(
        &state,
        &ctx,
        GeneratedArtifact::new(data, MediaFormat::Jpeg),
        params.save_to_file,
        "edited_image",
        params.metadata(model.as_deref()),
    )
    .await;
    finish(&state, &ctx, artifact, params.analyze, params.analysis_prompt.as_deref()).await
}

async fn finish(
    state: &AppState,
    ctx: &ToolContext,
    artifact: GeneratedArtifact,
    analyze: bool,
    analysis_prompt: Option<&str>,
) -> Result<Vec<ToolResponseContent>> {
    let caption = if analyze {
        Some(describe(state, ctx, artifact.data.clone(), analysis_prompt).await)
    } else {
        None
    };
    let mut content = vec![artifact.into_content()?];
    content.extend(caption);
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_defaults() {
        let params: GenerateImageParams =
            serde_json::from_value(json!({ "prompt": "a lighthouse" })).unwrap();
        assert_eq!((params.width, params.height), (1024, 1024));
        assert_eq!(params.num_inference_steps, 50);
        assert!(params.save_to_file);
        assert!(!params.analyze);

        let body = params.request_body(Some("org/flux"));
        assert_eq!(body["model"], "org/flux");
        assert_eq!(body["negative_prompt"], "");
        assert!(body["seed"].is_null());

        // Absent values never reach the upload metadata.
        let metadata = params.metadata(None);
        assert!(metadata.get("model").is_none());
        assert!(metadata.get("seed").is_none());
        assert_eq!(metadata.get("width"), Some(&json!(1024)));
    }

    #[test]
    fn test_generate_bounds() {
        let params: GenerateImageParams = serde_json::from_value(json!({
            "prompt": "p",
            "num_inference_steps": 101
        }))
        .unwrap();
        let err = params.validate().unwrap_err();
        assert!(err.to_string().contains("num_inference_steps"));

        let params: GenerateImageParams =
            serde_json::from_value(json!({ "prompt": "p", "width": 0 })).unwrap();
        assert!(matches!(params.validate(), Err(ToolError::InvalidArgument(_))));
    }

    #[test]
    fn test_edit_defaults_and_bounds() {
        let params: EditImageParams = serde_json::from_value(json!({
            "prompt": "make it night",
            "image_b64s": ["aGVsbG8="]
        }))
        .unwrap();
        assert_eq!(params.num_inference_steps, 40);
        assert_eq!(params.true_cfg_scale, 4.0);
        assert!(params.validate().is_ok());

        let body = params.request_body();
        assert!(body.get("model").is_none());
        assert_eq!(body["image_b64s"][0], "aGVsbG8=");
        assert_eq!(
            params.metadata(Some("org/edit")).get("model"),
            Some(&json!("org/edit"))
        );

        let empty: EditImageParams =
            serde_json::from_value(json!({ "prompt": "p", "image_b64s": [] })).unwrap();
        assert!(empty.validate().is_err());

        let scale: EditImageParams = serde_json::from_value(json!({
            "prompt": "p",
            "image_b64s": ["x"],
            "true_cfg_scale": 0.5
        }))
        .unwrap();
        assert!(scale.validate().is_err());
    }

    #[test]
    fn test_schema_publishes_bounds() {
        let schema = chutes_mcp_core::tools::tool_schema::<EditImageParams>();
        let properties = &schema["properties"];
        assert_eq!(properties["num_inference_steps"]["minimum"], 1.0);
        assert_eq!(properties["num_inference_steps"]["maximum"], 100.0);
        assert_eq!(properties["image_b64s"]["minItems"], 1);
        let required = schema["required"].as_array().unwrap();
        assert!(required.contains(&json!("prompt")));
        assert!(!required.contains(&json!("width")));
    }
}
