//! # Chutes MCP Core
//!
//! A small server-side implementation of the Model Context Protocol (MCP):
//! JSON-RPC message types, a method dispatcher, a tool registry whose input
//! schemas are derived from typed parameter structs, and an HTTP transport.
//!
//! ## Architecture
//!
//! - **Types**: data structures representing MCP concepts
//! - **Protocol**: JSON-RPC dispatch to typed handlers
//! - **Server**: the `initialize` handshake, tools and logging methods
//! - **Tools**: tool registry, schema generation and handler adapters
//! - **Context**: per-request logging and progress back to the client
//! - **Session**: per-connection handshake state and client log level
//! - **Transport**: HTTP+SSE sessions and a stateless `POST /mcp` endpoint
//!
//! ## Macros
//!
//! Helpers for building tool responses and content blocks.

pub mod context;
pub mod protocol;
pub mod server;
pub mod session;
pub mod tools;
pub mod transport;
pub mod types;

/// Creates a tool response carrying an error message, with `is_error` set.
///
/// # Examples
///
/// ```
/// use chutes_mcp_core::tool_error_response;
///
/// let response = tool_error_response!("Something went wrong");
/// assert_eq!(response.is_error, Some(true));
/// ```
#[macro_export]
macro_rules! tool_error_response {
    ($e:expr) => {{
        let error_message = $e.to_string();
        $crate::types::CallToolResponse {
            content: vec![$crate::types::ToolResponseContent::Text(
                $crate::types::TextContent {
                    text: error_message,
                    annotations: None,
                },
            )],
            is_error: Some(true),
            meta: None,
        }
    }};
}

/// Creates a text content block.
///
/// ```
/// use chutes_mcp_core::tool_text_content;
///
/// let content = tool_text_content!("Hello, world!".to_string());
/// ```
#[macro_export]
macro_rules! tool_text_content {
    ($e:expr) => {{
        $crate::types::ToolResponseContent::Text($crate::types::TextContent {
            text: $e,
            annotations: None,
        })
    }};
}

/// Creates an image content block from base64 data and a MIME type, with
/// optional annotations.
///
/// ```
/// use chutes_mcp_core::tool_image_content;
///
/// let content = tool_image_content!("aGVsbG8=".to_string(), "image/jpeg".to_string());
/// ```
#[macro_export]
macro_rules! tool_image_content {
    ($data:expr, $mime_type:expr) => {
        $crate::tool_image_content!($data, $mime_type, None)
    };
    ($data:expr, $mime_type:expr, $annotations:expr) => {{
        $crate::types::ToolResponseContent::Image($crate::types::ImageContent {
            data: $data,
            mime_type: $mime_type,
            annotations: $annotations,
        })
    }};
}

/// Creates an audio content block from base64 data and a MIME type, with
/// optional annotations.
#[macro_export]
macro_rules! tool_audio_content {
    ($data:expr, $mime_type:expr) => {
        $crate::tool_audio_content!($data, $mime_type, None)
    };
    ($data:expr, $mime_type:expr, $annotations:expr) => {{
        $crate::types::ToolResponseContent::Audio($crate::types::AudioContent {
            data: $data,
            mime_type: $mime_type,
            annotations: $annotations,
        })
    }};
}
