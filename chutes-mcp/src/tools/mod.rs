//! MCP tools backed by the Chutes API.
//!
//! Each tool is an async function taking the shared `AppState`, its typed
//! parameters and a `ToolContext`, returning content blocks or a
//! `ToolError`. Parameter structs double as the published input schemas.

pub mod image;
pub mod llm;
pub mod music;
pub mod status;
pub mod video;

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use chutes_mcp_core::{
    context::ToolContext,
    server::ServerProtocolBuilder,
    tool_text_content,
    tools::{tool_schema, typed_handler, ToolHandlerFn},
    types::{Tool, ToolAnnotations, ToolResponseContent},
};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;

use crate::artifact::GeneratedArtifact;
use crate::error::ToolError;
use crate::upload::UploadMetadata;
use crate::vision::{ImageInput, DEFAULT_ANALYSIS_PROMPT};
use crate::AppState;

/// Registers every tool on `builder`.
pub fn register_all(builder: ServerProtocolBuilder, state: &Arc<AppState>) -> ServerProtocolBuilder {
    llm::tools(state)
        .into_iter()
        .chain(image::tools(state))
        .chain(music::tools(state))
        .chain(video::tools(state))
        .chain(status::tools(state))
        .fold(builder, |builder, (tool, handler)| {
            builder.register_tool(tool, handler)
        })
}

/// Tool definition with the input schema derived from `P`.
pub(crate) fn tool<P: JsonSchema>(
    name: &str,
    description: &str,
    annotations: Option<ToolAnnotations>,
) -> Tool {
    Tool {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema: tool_schema::<P>(),
        annotations,
    }
}

/// Hints for tools that call the backend and may publish their output.
pub(crate) fn generation_hints(title: &str) -> ToolAnnotations {
    ToolAnnotations {
        title: Some(title.to_string()),
        read_only_hint: Some(false),
        open_world_hint: Some(true),
        ..Default::default()
    }
}

pub(crate) fn default_true() -> bool {
    true
}

/// Binds a tool function to the shared state. Failures are mirrored to the
/// client log before being returned as an error result.
pub(crate) fn handler<P, F, Fut>(state: &Arc<AppState>, name: &'static str, f: F) -> ToolHandlerFn
where
    P: DeserializeOwned + Send + 'static,
    F: Fn(Arc<AppState>, P, ToolContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<ToolResponseContent>, ToolError>> + Send + 'static,
{
    let state = state.clone();
    typed_handler(move |params: P, ctx: ToolContext| {
        let log = ctx.clone();
        let call = f(state.clone(), params, ctx);
        async move {
            let result = call.await;
            if let Err(e) = &result {
                log.error(format!("{} failed: {}", name, e)).await;
            }
            result
        }
    })
}

/// Uploads the artifact when asked to and attaches the resulting URL.
pub(crate) async fn publish(
    state: &AppState,
    ctx: &ToolContext,
    artifact: GeneratedArtifact,
    save_to_file: bool,
    name_prefix: &str,
    metadata: UploadMetadata,
) -> GeneratedArtifact {
    if !save_to_file {
        return artifact;
    }
    if !state.uploader.is_configured() {
        ctx.info("ImageKit is not configured. Skipping upload.").await;
        return artifact;
    }

    ctx.debug(format!("Uploading {} to ImageKit", name_prefix)).await;
    let url = state
        .uploader
        .upload(
            &artifact.data,
            name_prefix,
            &metadata,
            artifact.format.extension(),
        )
        .await;
    match &url {
        Some(url) => ctx.info(format!("{} uploaded to ImageKit: {}", name_prefix, url)).await,
        None => ctx.error(format!("Failed to upload {} to ImageKit", name_prefix)).await,
    }
    artifact.with_url(url)
}

/// Captions an image with the vision model. A failed caption is reported as
/// text rather than failing the call that produced the image.
pub(crate) async fn describe(
    state: &AppState,
    ctx: &ToolContext,
    image: Bytes,
    prompt: Option<&str>,
) -> ToolResponseContent {
    let prompt = prompt.unwrap_or(DEFAULT_ANALYSIS_PROMPT);
    ctx.info("Analyzing generated image").await;
    match state.vision.ask(prompt, &[ImageInput::Bytes(image)]).await {
        Ok(caption) => tool_text_content!(caption),
        Err(e) => {
            ctx.warning(format!("Image analysis failed: {}", e)).await;
            tool_text_content!(format!("Image analysis failed: {}", e))
        }
    }
}
