//! # MCP Transport Layer
//!
//! JSON-RPC message types and the `Transport` abstraction used by the
//! server side of the protocol.
//!
//! A transport is two things at once: the listener that accepts client
//! connections (`open`/`close`), and, for a connected client, the peer that
//! server-originated messages (responses, log and progress notifications)
//! are written to.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(feature = "sse")]
mod sse;
#[cfg(feature = "sse")]
pub use sse::{configure, ServerSseTransport};

/// A message in the MCP protocol.
///
/// Only JSON-RPC messages are supported.
pub type Message = JsonRpcMessage;

/// Core trait that defines operations for MCP transports.
#[async_trait()]
pub trait Transport: Send + Sync + 'static {
    /// Opens the transport and serves until it is shut down.
    async fn open(&self) -> Result<()>;

    /// Closes the transport and releases any resources.
    async fn close(&self) -> Result<()>;

    /// Polls for the next message queued for the other endpoint.
    ///
    /// `None` means the stream of messages has ended.
    async fn poll_message(&self) -> Result<Option<Message>>;

    /// Sends a notification.
    ///
    /// Unlike requests, notifications do not expect a response.
    async fn send_notification(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<()>;

    /// Sends a response to a request.
    async fn send_response(
        &self,
        id: RequestId,
        result: Option<serde_json::Value>,
        error: Option<JsonRpcError>,
    ) -> Result<()>;
}

/// JSON-RPC request id. Clients may use numbers or strings; replies echo
/// whatever was received.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl Default for RequestId {
    fn default() -> Self {
        RequestId::Number(0)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => f.write_str(s),
        }
    }
}

/// The `jsonrpc` member; always "2.0".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct JsonRpcVersion(String);

impl Default for JsonRpcVersion {
    fn default() -> Self {
        JsonRpcVersion("2.0".to_owned())
    }
}

/// Any message a client may post.
///
/// Variants are tried in order. Unknown fields are rejected, so anything
/// with a `method` skips `Response`, and only an `id` makes it a `Request`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Response(JsonRpcResponse),
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct JsonRpcRequest {
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    pub jsonrpc: JsonRpcVersion,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
#[serde(deny_unknown_fields)]
#[serde(default)]
pub struct JsonRpcNotification {
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    pub jsonrpc: JsonRpcVersion,
}

/// Reply to a request; exactly one of `result` and `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct JsonRpcResponse {
    pub id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub jsonrpc: JsonRpcVersion,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct JsonRpcError {
    /// One of [`ErrorCode`](crate::types::ErrorCode).
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_and_notification_are_distinguished() {
        let msg: Message =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#).unwrap();
        assert!(matches!(msg, JsonRpcMessage::Request(ref r) if r.id == RequestId::Number(1)));

        let msg: Message =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
                .unwrap();
        assert!(matches!(msg, JsonRpcMessage::Notification(_)));

        let msg: Message =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":"abc","result":{}}"#).unwrap();
        assert!(
            matches!(msg, JsonRpcMessage::Response(ref r) if r.id == RequestId::String("abc".into()))
        );
    }

    #[test]
    fn test_string_ids_are_echoed() {
        let response = JsonRpcResponse {
            id: RequestId::String("req-9".to_string()),
            result: Some(serde_json::json!({})),
            ..Default::default()
        };
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"id":"req-9","result":{},"jsonrpc":"2.0"}"#);
    }
}
