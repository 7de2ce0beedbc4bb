//! # MCP Protocol Implementation
//!
//! The JSON-RPC dispatch layer: incoming requests and notifications are
//! routed by method name to typed handlers registered through
//! `ProtocolBuilder`.
//!
//! The protocol is transport-agnostic. A transport hands each request over
//! together with the peer it came from, and the protocol turns that peer into
//! a `ToolContext` so handlers can log to the client or report progress.
//! Handler tables are shared; each `Protocol` value carries the `Session` of
//! the connection it serves.

use crate::context::ToolContext;
use crate::session::Session;
use crate::transport::{JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, Transport};
use crate::types::{ErrorCode, LoggingLevel};
use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use std::{collections::HashMap, sync::Arc};

/// Boxed future returned by request handlers.
pub type HandlerFuture<Resp> = Pin<Box<dyn Future<Output = Result<Resp>> + Send>>;

/// The core protocol handler for MCP.
///
/// Cloning is cheap and keeps the session; use [`Protocol::new_session`] to
/// serve another connection.
#[derive(Clone)]
pub struct Protocol {
    request_handlers: Arc<HashMap<String, Box<dyn RequestHandler>>>,
    notification_handlers: Arc<HashMap<String, Box<dyn NotificationHandler>>>,
    session: Arc<Session>,
}

impl Protocol {
    pub fn builder() -> ProtocolBuilder {
        ProtocolBuilder::new()
    }

    /// The same handlers bound to a fresh, uninitialized session.
    pub fn new_session(&self) -> Protocol {
        self.with_session(Session::new())
    }

    /// The same handlers bound to a session that needs no handshake.
    pub fn stateless(&self) -> Protocol {
        self.with_session(Session::stateless())
    }

    fn with_session(&self, session: Session) -> Protocol {
        Protocol {
            request_handlers: self.request_handlers.clone(),
            notification_handlers: self.notification_handlers.clone(),
            session: Arc::new(session),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Dispatches a request to its handler and returns the response to send.
    ///
    /// `peer` is the connection the request arrived on, if the transport can
    /// push messages back to it.
    pub async fn handle_request(
        &self,
        request: JsonRpcRequest,
        peer: Option<Arc<dyn Transport>>,
    ) -> JsonRpcResponse {
        let Some(handler) = self.request_handlers.get(&request.method) else {
            tracing::debug!("No handler for method: {}", request.method);
            return error_response(
                request.id,
                ErrorCode::MethodNotFound,
                format!("Method not found: {}", request.method),
            );
        };

        let ctx = ToolContext::new(peer, self.session.log_level().await)
            .with_session(self.session.clone());
        let id = request.id.clone();
        match handler.handle(request, ctx).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Request {} failed: {}", id, e);
                error_response(id, ErrorCode::InternalError, e.to_string())
            }
        }
    }

    /// Dispatches a notification. Unknown methods are ignored.
    pub async fn handle_notification(&self, notification: JsonRpcNotification) {
        if let Some(handler) = self.notification_handlers.get(&notification.method) {
            match handler.handle(notification.clone(), self.session.clone()).await {
                Ok(_) => tracing::info!("Received notification: {:?}", notification.method),
                Err(e) => tracing::error!("Error handling notification: {}", e),
            }
        } else {
            tracing::debug!("No handler for notification: {}", notification.method);
        }
    }

    /// The server never issues requests, so responses from the client are
    /// only logged.
    pub async fn handle_response(&self, response: JsonRpcResponse) {
        tracing::debug!("Ignoring response for request {}", response.id);
    }

    /// The minimum level of log messages forwarded to this session's client.
    pub async fn log_level(&self) -> LoggingLevel {
        self.session.log_level().await
    }
}

fn error_response(
    id: crate::transport::RequestId,
    code: ErrorCode,
    message: String,
) -> JsonRpcResponse {
    JsonRpcResponse {
        id,
        result: None,
        error: Some(JsonRpcError {
            code: code as i32,
            message,
            data: None,
        }),
        ..Default::default()
    }
}

/// Builder for creating configured protocols.
pub struct ProtocolBuilder {
    request_handlers: HashMap<String, Box<dyn RequestHandler>>,
    notification_handlers: HashMap<String, Box<dyn NotificationHandler>>,
}

impl Default for ProtocolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolBuilder {
    pub fn new() -> Self {
        Self {
            request_handlers: HashMap::new(),
            notification_handlers: HashMap::new(),
        }
    }

    /// Registers a typed request handler.
    ///
    /// Missing or `null` params are decoded from `{}`. Params that fail to
    /// decode produce an `InvalidParams` error without calling the handler.
    pub fn request_handler<Req, Resp>(
        mut self,
        method: &str,
        handler: impl Fn(Req, ToolContext) -> HandlerFuture<Resp> + Send + Sync + 'static,
    ) -> Self
    where
        Req: DeserializeOwned + Send + Sync + 'static,
        Resp: Serialize + Send + Sync + 'static,
    {
        let handler = TypedRequestHandler {
            handler: Box::new(handler),
            _phantom: std::marker::PhantomData,
        };
        self.request_handlers
            .insert(method.to_string(), Box::new(handler));
        self
    }

    /// Registers a typed notification handler. The handler also receives the
    /// session the notification arrived on.
    pub fn notification_handler<N>(
        mut self,
        method: &str,
        handler: impl Fn(N, Arc<Session>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>
            + Send
            + Sync
            + 'static,
    ) -> Self
    where
        N: DeserializeOwned + Send + Sync + 'static,
    {
        let handler = TypedNotificationHandler {
            handler: Box::new(handler),
            _phantom: std::marker::PhantomData,
        };
        self.notification_handlers
            .insert(method.to_string(), Box::new(handler));
        self
    }

    pub fn build(self) -> Protocol {
        Protocol {
            request_handlers: Arc::new(self.request_handlers),
            notification_handlers: Arc::new(self.notification_handlers),
            session: Arc::new(Session::new()),
        }
    }
}

#[async_trait]
trait RequestHandler: Send + Sync {
    async fn handle(&self, request: JsonRpcRequest, ctx: ToolContext) -> Result<JsonRpcResponse>;
}

#[async_trait]
trait NotificationHandler: Send + Sync {
    async fn handle(&self, notification: JsonRpcNotification, session: Arc<Session>) -> Result<()>;
}

/// Adapts a typed handler function to `RequestHandler`, decoding params and
/// encoding the result.
struct TypedRequestHandler<Req, Resp>
where
    Req: DeserializeOwned + Send + Sync + 'static,
    Resp: Serialize + Send + Sync + 'static,
{
    handler: Box<dyn Fn(Req, ToolContext) -> HandlerFuture<Resp> + Send + Sync>,
    _phantom: std::marker::PhantomData<(Req, Resp)>,
}

#[async_trait]
impl<Req, Resp> RequestHandler for TypedRequestHandler<Req, Resp>
where
    Req: DeserializeOwned + Send + Sync + 'static,
    Resp: Serialize + Send + Sync + 'static,
{
    async fn handle(&self, request: JsonRpcRequest, ctx: ToolContext) -> Result<JsonRpcResponse> {
        let params = match request.params {
            None | Some(serde_json::Value::Null) => json!({}),
            Some(params) => params,
        };
        let params: Req = match serde_json::from_value(params) {
            Ok(params) => params,
            Err(e) => {
                return Ok(error_response(
                    request.id,
                    ErrorCode::InvalidParams,
                    format!("Invalid params: {}", e),
                ))
            }
        };

        let result = (self.handler)(params, ctx).await?;
        Ok(JsonRpcResponse {
            id: request.id,
            result: Some(serde_json::to_value(result)?),
            error: None,
            ..Default::default()
        })
    }
}

struct TypedNotificationHandler<N>
where
    N: DeserializeOwned + Send + Sync + 'static,
{
    handler: Box<
        dyn Fn(N, Arc<Session>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync,
    >,
    _phantom: std::marker::PhantomData<N>,
}

#[async_trait]
impl<N> NotificationHandler for TypedNotificationHandler<N>
where
    N: DeserializeOwned + Send + Sync + 'static,
{
    async fn handle(&self, notification: JsonRpcNotification, session: Arc<Session>) -> Result<()> {
        let params = notification.params.unwrap_or(serde_json::Value::Null);
        let params: N = serde_json::from_value(params)?;
        (self.handler)(params, session).await
    }
}
