//! # Chutes MCP
//!
//! An MCP server exposing the Chutes generation APIs as tools: chat
//! completion (plain and streamed), image generation and editing, music,
//! video from text or images, and a health check.
//!
//! Generated images, audio and video can be published to ImageKit as a side
//! effect; the public URL then travels back in the content's `imagekit_url`
//! annotation. Images can optionally be captioned by a vision model.
//!
//! All settings come from one YAML document (see [`config::Settings`]) that
//! is loaded once and shared read-only through [`AppState`].

pub mod artifact;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod stream;
pub mod tools;
pub mod upload;
pub mod vision;

use std::sync::Arc;

use chutes_mcp_core::{
    protocol::Protocol,
    server::Server,
    types::{ServerCapabilities, ToolCapabilities, LATEST_PROTOCOL_VERSION},
};
use serde_json::json;

use crate::config::Settings;
use crate::http::ChutesClient;
use crate::upload::ImageKitUploader;
use crate::vision::VisionClient;

pub const SERVER_NAME: &str = "chutes-mcp";

const INSTRUCTIONS: &str = "Tools for the Chutes AI platform. Use chutes_chat or chutes_chat_stream for text, \
generate_image and edit_image for images, generate_music for audio and the generate_video_* tools for video. \
Generated media is uploaded to ImageKit when save_to_file is true and the upload URL is returned in the \
imagekit_url annotation. Run check_mcp_status to diagnose connectivity.";

/// Everything a tool call needs, built once at startup.
pub struct AppState {
    pub settings: Arc<Settings>,
    pub client: ChutesClient,
    pub uploader: ImageKitUploader,
    pub vision: VisionClient,
}

impl AppState {
    pub fn new(settings: Settings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("chutes-mcp/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_http(Arc::new(settings), http))
    }

    /// State sharing an existing HTTP client.
    pub fn with_http(settings: Arc<Settings>, http: reqwest::Client) -> Self {
        let client = ChutesClient::new(settings.clone(), http.clone());
        Self {
            uploader: ImageKitUploader::new(settings.clone(), http),
            vision: VisionClient::new(client.clone()),
            client,
            settings,
        }
    }
}

/// The MCP protocol with every tool registered against `state`.
pub fn build_protocol(state: Arc<AppState>) -> Protocol {
    let builder = Server::builder(
        SERVER_NAME.to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
        LATEST_PROTOCOL_VERSION,
    )
    .set_capabilities(ServerCapabilities {
        tools: Some(ToolCapabilities {
            list_changed: Some(false),
        }),
        logging: Some(json!({})),
        ..Default::default()
    })
    .set_instructions(INSTRUCTIONS.to_string());

    tools::register_all(builder, &state).build()
}
