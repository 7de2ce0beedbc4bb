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
use crate::error::Result;
use crate::http::Capability;
use crate::upload::UploadMetadata;
use crate::AppState;

use super::{default_true, generation_hints, handler, publish, tool};

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GenerateMusicParams {
    /// A description of the desired music style.
    #[serde(default)]
    pub style_prompt: Option<String>,
    /// The lyrics for the song.
    #[serde(default)]
    pub lyrics: Option<String>,
    /// A base64 encoded audio file to be used as input.
    #[serde(default)]
    pub audio_b64: Option<String>,
    /// If true, uploads the audio to ImageKit as a side effect.
    #[serde(default = "default_true")]
    pub save_to_file: bool,
}

impl GenerateMusicParams {
    fn request_body(&self) -> Value {
        json!({
            "style_prompt": self.style_prompt,
            "lyrics": self.lyrics,
            "audio_b64": self.audio_b64,
        })
    }

    fn metadata(&self, model: Option<&str>) -> UploadMetadata {
        UploadMetadata::new()
            .with("model", model)
            .with("style_prompt", &self.style_prompt)
            .with("lyrics", &self.lyrics)
    }
}

pub(crate) fn tools(state: &Arc<AppState>) -> Vec<(Tool, ToolHandlerFn)> {
    vec![(
        tool::<GenerateMusicParams>(
            "generate_music",
            "Generates a music file. By default, it uploads the file to ImageKit as a side effect.",
            Some(generation_hints("Generate Music")),
        ),
        handler(state, "generate_music", generate_music),
    )]
}

pub async fn generate_music(
    state: Arc<AppState>,
    params: GenerateMusicParams,
    ctx: ToolContext,
) -> Result<Vec<ToolResponseContent>> {
    tracing::debug!(
        "Generate music parameters: style_prompt={:?}, lyrics={:?}, audio_b64={}, save_to_file={}",
        params.style_prompt,
        params.lyrics,
        if params.audio_b64.is_some() { "<present>" } else { "<absent>" },
        params.save_to_file
    );

    let data = state
        .client
        .post_bytes(Capability::TextToMusic, &params.request_body())
        .await?;
    ctx.info(format!("Received {} bytes of audio data", data.len())).await;

    let model = state.client.model(Capability::TextToMusic);
    let artifact = publish(
        &state,
        &ctx,
        GeneratedArtifact::new(data, MediaFormat::Wav),
        params.save_to_file,
        "generated_music",
        params.metadata(model.as_deref()),
    )
    .await;
    Ok(vec![artifact.into_content()?])
}
