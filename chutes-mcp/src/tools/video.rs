//! Video generation tools. Videos are returned as embedded `video/mp4`
//! resources and may take minutes, so each call reports coarse progress.

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
use crate::error::{check_min, check_range, Result};
use crate::http::Capability;
use crate::upload::UploadMetadata;
use crate::AppState;

use super::{default_true, generation_hints, handler, publish, tool};

pub const DEFAULT_NEGATIVE_PROMPT: &str = "Vibrant colors, overexposed, static, blurry details, subtitles, style, artwork, painting, picture, still, overall grayish, worst quality, low quality, JPEG compression artifacts, ugly, incomplete, extra fingers, poorly drawn hands, poorly drawn face, deformed, disfigured, malformed limbs, fused fingers, motionless image, cluttered background, three legs, many people in the background, walking backwards, slow motion";

const STAGES: f64 = 2.0;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct TextToVideoParams {
    /// A text description of the desired video to generate.
    pub prompt: String,
    /// A text description of what to avoid in the video.
    #[serde(default = "default_negative_prompt")]
    pub negative_prompt: String,
    /// The resolution of the video (e.g. '832*480', '1024*576').
    #[serde(default = "default_text_resolution")]
    pub resolution: String,
    /// The frames per second of the video.
    #[serde(default = "default_fps")]
    #[schemars(range(min = 1, max = 60))]
    pub fps: u32,
    /// The number of frames to generate for the video.
    #[serde(default = "default_frames")]
    #[schemars(range(min = 1))]
    pub frames: u32,
    /// The number of denoising steps.
    #[serde(default = "default_steps")]
    #[schemars(range(min = 1, max = 100))]
    pub steps: u32,
    /// How closely the model should follow the prompt.
    #[serde(default = "default_guidance_scale")]
    #[schemars(range(min = 1.0, max = 20.0))]
    pub guidance_scale: f64,
    /// A seed for reproducible generation. Null picks a random seed.
    #[serde(default = "default_seed")]
    pub seed: Option<i64>,
    /// If true, uploads the generated video to ImageKit for persistent storage and URL access.
    #[serde(default = "default_true")]
    pub save_to_file: bool,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ImageToVideoParams {
    /// A text description of the desired video to generate.
    pub prompt: String,
    /// A base64 encoded image to use as the starting point for video generation.
    pub image_b64: String,
    /// A text description of what to avoid in the video.
    #[serde(default = "default_negative_prompt")]
    pub negative_prompt: String,
    /// The number of denoising steps.
    #[serde(default = "default_steps")]
    #[schemars(range(min = 1, max = 100))]
    pub steps: u32,
    /// How closely the model should follow the prompt.
    #[serde(default = "default_guidance_scale")]
    #[schemars(range(min = 1.0, max = 20.0))]
    pub guidance_scale: f64,
    /// A seed for reproducible generation. Null picks a random seed.
    #[serde(default = "default_seed")]
    pub seed: Option<i64>,
    /// If true, uploads the generated video to ImageKit for persistent storage and URL access.
    #[serde(default = "default_true")]
    pub save_to_file: bool,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FastImageToVideoParams {
    /// A text description of the desired video to generate.
    pub prompt: String,
    /// Image URL or base64 encoded data to use as the starting point for video generation.
    pub image: String,
    /// A text description of what to avoid in the video.
    #[serde(default = "default_negative_prompt")]
    pub negative_prompt: String,
    /// The frames per second of the video.
    #[serde(default = "default_fast_fps")]
    #[schemars(range(min = 1, max = 60))]
    pub fps: u32,
    /// The number of frames to generate for the video.
    #[serde(default = "default_frames")]
    #[schemars(range(min = 1))]
    pub frames: u32,
    /// How closely the model should follow the prompt.
    #[serde(default = "default_fast_guidance_scale")]
    #[schemars(range(min = 1.0, max = 20.0))]
    pub guidance_scale: f64,
    /// A second guidance scale parameter for fine-tuning.
    #[serde(default = "default_fast_guidance_scale")]
    #[schemars(range(min = 1.0, max = 20.0))]
    pub guidance_scale_2: f64,
    /// A seed for reproducible generation. Null picks a random seed.
    #[serde(default)]
    pub seed: Option<i64>,
    /// Enables the ultra fast Pruna mode.
    #[serde(default = "default_true")]
    pub fast: bool,
    /// The resolution of the video (e.g. '480p', '720p', '1080p').
    #[serde(default = "default_fast_resolution")]
    pub resolution: String,
    /// If true, uploads the generated video to ImageKit for persistent storage and URL access.
    #[serde(default = "default_true")]
    pub save_to_file: bool,
}

fn default_negative_prompt() -> String {
    DEFAULT_NEGATIVE_PROMPT.to_string()
}

fn default_text_resolution() -> String {
    "832*480".to_string()
}

fn default_fast_resolution() -> String {
    "480p".to_string()
}

fn default_fps() -> u32 {
    24
}

fn default_fast_fps() -> u32 {
    16
}

fn default_frames() -> u32 {
    81
}

fn default_steps() -> u32 {
    25
}

fn default_guidance_scale() -> f64 {
    5.0
}

fn default_fast_guidance_scale() -> f64 {
    1.0
}

fn default_seed() -> Option<i64> {
    Some(42)
}

impl TextToVideoParams {
    fn validate(&self) -> Result<()> {
        check_range("fps", self.fps, 1, 60)?;
        check_min("frames", self.frames, 1)?;
        check_range("steps", self.steps, 1, 100)?;
        check_range("guidance_scale", self.guidance_scale, 1.0, 20.0)
    }

    fn request_body(&self) -> Value {
        json!({
            "prompt": self.prompt,
            "negative_prompt": self.negative_prompt,
            "resolution": self.resolution,
            "fps": self.fps,
            "frames": self.frames,
            "steps": self.steps,
            "guidance_scale": self.guidance_scale,
            "seed": self.seed,
        })
    }

    fn metadata(&self, model: Option<&str>) -> UploadMetadata {
        UploadMetadata::new()
            .with("model", model)
            .with("prompt", &self.prompt)
            .with("negative_prompt", &self.negative_prompt)
            .with("resolution", &self.resolution)
            .with("fps", self.fps)
            .with("frames", self.frames)
            .with("steps", self.steps)
            .with("guidance_scale", self.guidance_scale)
            .with("seed", self.seed)
    }
}

impl ImageToVideoParams {
    fn validate(&self) -> Result<()> {
        check_range("steps", self.steps, 1, 100)?;
        check_range("guidance_scale", self.guidance_scale, 1.0, 20.0)
    }

    fn request_body(&self) -> Value {
        json!({
            "prompt": self.prompt,
            "image_b64": self.image_b64,
            "negative_prompt": self.negative_prompt,
            "steps": self.steps,
            "guidance_scale": self.guidance_scale,
            "seed": self.seed,
        })
    }

    fn metadata(&self, model: Option<&str>) -> UploadMetadata {
        UploadMetadata::new()
            .with("model", model)
            .with("prompt", &self.prompt)
            .with("negative_prompt", &self.negative_prompt)
            .with("steps", self.steps)
            .with("guidance_scale", self.guidance_scale)
            .with("seed", self.seed)
    }
}

impl FastImageToVideoParams {
    fn validate(&self) -> Result<()> {
        check_range("fps", self.fps, 1, 60)?;
        check_min("frames", self.frames, 1)?;
        check_range("guidance_scale", self.guidance_scale, 1.0, 20.0)?;
        check_range("guidance_scale_2", self.guidance_scale_2, 1.0, 20.0)
    }

    fn request_body(&self) -> Value {
        json!({
            "prompt": self.prompt,
            "image": self.image,
            "negative_prompt": self.negative_prompt,
            "fps": self.fps,
            "frames": self.frames,
            "guidance_scale": self.guidance_scale,
            "guidance_scale_2": self.guidance_scale_2,
            "seed": self.seed,
            "fast": self.fast,
            "resolution": self.resolution,
        })
    }

    fn metadata(&self, model: Option<&str>) -> UploadMetadata {
        UploadMetadata::new()
            .with("model", model)
            .with("prompt", &self.prompt)
            .with("negative_prompt", &self.negative_prompt)
            .with("fps", self.fps)
            .with("frames", self.frames)
            .with("guidance_scale", self.guidance_scale)
            .with("guidance_scale_2", self.guidance_scale_2)
            .with("seed", self.seed)
            .with("fast", self.fast)
            .with("resolution", &self.resolution)
    }
}

pub(crate) fn tools(state: &Arc<AppState>) -> Vec<(Tool, ToolHandlerFn)> {
    vec![
        (
            tool::<TextToVideoParams>(
                "generate_video_from_text",
                "Generates a video from a text prompt. By default, uploads the video to ImageKit as a side effect.",
                Some(generation_hints("Generate Video from Text")),
            ),
            handler(state, "generate_video_from_text", generate_video_from_text),
        ),
        (
            tool::<ImageToVideoParams>(
                "generate_video_from_image",
                "Generates a video from an image and prompt. By default, uploads the video to ImageKit as a side effect.",
                Some(generation_hints("Generate Video from Image")),
            ),
            handler(state, "generate_video_from_image", generate_video_from_image),
        ),
        (
            tool::<FastImageToVideoParams>(
                "generate_video_from_image_fast",
                "Generates a video from an image using a fast model. By default, uploads the video to ImageKit as a side effect.",
                Some(generation_hints("Generate Video from Image (Fast)")),
            ),
            handler(
                state,
                "generate_video_from_image_fast",
                generate_video_from_image_fast,
            ),
        ),
    ]
}

pub async fn generate_video_from_text(
    state: Arc<AppState>,
    params: TextToVideoParams,
    ctx: ToolContext,
) -> Result<Vec<ToolResponseContent>> {
    params.validate()?;
    tracing::debug!("Generate video from text parameters: {:?}", params);
    let model = state.client.model(Capability::TextToVideo);
    render(
        &state,
        &ctx,
        Capability::TextToVideo,
        params.request_body(),
        params.save_to_file,
        "generated_video_from_text",
        params.metadata(model.as_deref()),
    )
    .await
}

pub async fn generate_video_from_image(
    state: Arc<AppState>,
    params: ImageToVideoParams,
    ctx: ToolContext,
) -> Result<Vec<ToolResponseContent>> {
    params.validate()?;
    tracing::debug!(
        "Generate video from image parameters: prompt='{}', steps={}, guidance_scale={}, seed={:?}, save_to_file={}",
        params.prompt,
        params.steps,
        params.guidance_scale,
        params.seed,
        params.save_to_file
    );
    let model = state.client.model(Capability::ImageToVideo);
    render(
        &state,
        &ctx,
        Capability::ImageToVideo,
        params.request_body(),
        params.save_to_file,
        "generated_video_from_image",
        params.metadata(model.as_deref()),
    )
    .await
}

pub async fn generate_video_from_image_fast(
    state: Arc<AppState>,
    params: FastImageToVideoParams,
    ctx: ToolContext,
) -> Result<Vec<ToolResponseContent>> {
    params.validate()?;
    tracing::debug!(
        "Generate fast video parameters: prompt='{}', fps={}, frames={}, guidance_scale={}, guidance_scale_2={}, seed={:?}, fast={}, resolution={}",
        params.prompt,
        params.fps,
        params.frames,
        params.guidance_scale,
        params.guidance_scale_2,
        params.seed,
        params.fast,
        params.resolution
    );
    let model = state.client.model(Capability::ImageToVideoFast);
    render(
        &state,
        &ctx,
        Capability::ImageToVideoFast,
        params.request_body(),
        params.save_to_file,
        "generated_video_from_image_fast",
        params.metadata(model.as_deref()),
    )
    .await
}

async fn render(
    state: &AppState,
    ctx: &ToolContext,
    capability: Capability,
    body: Value,
    save_to_file: bool,
    name_prefix: &str,
    metadata: UploadMetadata,
) -> Result<Vec<ToolResponseContent>> {
    ctx.report_progress(0.0, Some(STAGES), Some("Request sent")).await;
    let data = state.client.post_bytes(capability, &body).await?;
    ctx.info(format!("Received {} bytes of video data from {}", data.len(), capability))
        .await;
    ctx.report_progress(1.0, Some(STAGES), Some("Video received")).await;

    let artifact = publish(
        state,
        ctx,
        GeneratedArtifact::new(data, MediaFormat::Mp4),
        save_to_file,
        name_prefix,
        metadata,
    )
    .await;
    ctx.report_progress(STAGES, Some(STAGES), Some("Done")).await;
    Ok(vec![artifact.into_content()?])
}
