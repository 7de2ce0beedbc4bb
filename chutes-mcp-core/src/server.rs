//! # MCP Server
//!
//! Server-side lifecycle of the Model Context Protocol: the `initialize`
//! handshake, tool discovery and invocation, `ping`, and the client's choice
//! of logging level.
//!
//! `ServerProtocolBuilder` collects server metadata and tools and produces a
//! `Protocol` that any transport can drive. Tools stay locked until the
//! session has sent `notifications/initialized`.

use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

use crate::{
    context::ToolContext,
    protocol::{HandlerFuture, Protocol, ProtocolBuilder},
    session::Session,
    tools::{ToolHandler, ToolHandlerFn, Tools},
    transport::Transport,
    types::{
        CallToolRequest, CallToolResponse, Implementation, InitializeRequest, InitializeResponse,
        ListRequest, ProtocolVersion, ServerCapabilities, SetLevelRequest, Tool,
        ToolsListResponse, LATEST_PROTOCOL_VERSION,
    },
};
use anyhow::Result;
use serde_json::json;

#[derive(Clone)]
pub struct Server;

impl Server {
    pub fn builder(
        name: String,
        version: String,
        protocol_version: ProtocolVersion,
    ) -> ServerProtocolBuilder {
        ServerProtocolBuilder::new(name, version).set_protocol_version(protocol_version)
    }

    /// Serves until the transport shuts down.
    pub async fn start<T: Transport>(transport: T) -> Result<()> {
        transport.open().await
    }
}

/// Builder for server protocols.
pub struct ServerProtocolBuilder {
    protocol_version: ProtocolVersion,
    protocol_builder: ProtocolBuilder,
    server_info: Implementation,
    capabilities: ServerCapabilities,
    instructions: Option<String>,
    tools: HashMap<String, ToolHandler>,
}

impl ServerProtocolBuilder {
    pub fn new(name: String, version: String) -> Self {
        ServerProtocolBuilder {
            protocol_version: LATEST_PROTOCOL_VERSION,
            protocol_builder: ProtocolBuilder::new(),
            server_info: Implementation { name, version },
            capabilities: ServerCapabilities::default(),
            instructions: None,
            tools: HashMap::new(),
        }
    }

    pub fn set_protocol_version(mut self, protocol_version: ProtocolVersion) -> Self {
        self.protocol_version = protocol_version;
        self
    }

    pub fn set_capabilities(mut self, capabilities: ServerCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Sets the instructions returned from `initialize`, a hint to the model
    /// on how to use the tools.
    pub fn set_instructions(mut self, instructions: String) -> Self {
        self.instructions = Some(instructions);
        self
    }

    /// Registers a tool. A later registration with the same name replaces
    /// the earlier one.
    pub fn register_tool(mut self, tool: Tool, f: ToolHandlerFn) -> Self {
        self.tools.insert(tool.name.clone(), ToolHandler { tool, f });
        self
    }

    fn handle_init(
        protocol_version: ProtocolVersion,
        server_info: Implementation,
        capabilities: ServerCapabilities,
        instructions: Option<String>,
    ) -> impl Fn(InitializeRequest, ToolContext) -> HandlerFuture<InitializeResponse> {
        move |req, _ctx| {
            let server_info = server_info.clone();
            let capabilities = capabilities.clone();
            let instructions = instructions.clone();
            let protocol_version = protocol_version.clone();

            Box::pin(async move {
                tracing::info!(
                    "Client {} {} connected (protocol {})",
                    req.client_info.name,
                    req.client_info.version,
                    req.protocol_version
                );
                Ok(InitializeResponse {
                    protocol_version: protocol_version.as_str().to_string(),
                    capabilities,
                    server_info,
                    instructions,
                })
            })
        }
    }

    // Params are optional and may carry `_meta`; neither matters here.
    fn handle_initialized(
        _params: serde_json::Value,
        session: Arc<Session>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
        Box::pin(async move {
            session.mark_initialized();
            Ok(())
        })
    }

    /// Builds the server protocol.
    pub fn build(self) -> Protocol {
        let tools = Arc::new(Tools::new(self.tools));
        let tools_list = tools.clone();
        let tools_call = tools;

        self.protocol_builder
            .request_handler(
                "initialize",
                Self::handle_init(
                    self.protocol_version.clone(),
                    self.server_info,
                    self.capabilities,
                    self.instructions,
                ),
            )
            .notification_handler("notifications/initialized", Self::handle_initialized)
            .request_handler("ping", |_: serde_json::Value, _ctx| {
                Box::pin(async move { Ok(json!({})) })
            })
            .request_handler("logging/setLevel", |req: SetLevelRequest, ctx: ToolContext| {
                Box::pin(async move {
                    ctx.session().set_log_level(req.level).await;
                    tracing::debug!("Client log level set to {:?}", req.level);
                    Ok(json!({}))
                })
            })
            .request_handler("tools/list", move |_req: ListRequest, ctx: ToolContext| {
                let tools_list = tools_list.clone();
                Box::pin(async move {
                    ensure_initialized(ctx.session())?;
                    Ok(ToolsListResponse {
                        tools: tools_list.list_tools(),
                        next_cursor: None,
                        meta: None,
                    })
                })
            })
            .request_handler("tools/call", move |req: CallToolRequest, ctx: ToolContext| {
                let tools_call = tools_call.clone();
                Box::pin(async move {
                    ensure_initialized(ctx.session())?;
                    tracing::info!("Calling tool {}", req.name);
                    let response: CallToolResponse = tools_call.call_tool(req, ctx).await?;
                    Ok(response)
                })
            })
            .build()
    }
}

fn ensure_initialized(session: &Session) -> Result<()> {
    if session.is_initialized() {
        Ok(())
    } else {
        Err(anyhow::anyhow!("Client not initialized"))
    }
}
