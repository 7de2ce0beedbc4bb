use crate::{
    protocol::Protocol,
    transport::{
        JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcResponse, Message, RequestId,
        Transport,
    },
};
use actix_web::{
    middleware::Logger,
    web::{self, Query},
    App, HttpResponse, HttpServer,
};
use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use std::{collections::HashMap, time::Duration};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

const SESSION_QUEUE_SIZE: usize = 100;
/// Largest JSON-RPC message accepted. Tool calls carry base64 images.
pub const MAX_MESSAGE_BYTES: usize = 64 * 1024 * 1024;
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// HTTP server transport for MCP clients.
///
/// Two flavours of the protocol are served from the same listener:
///
/// - `GET /sse` + `POST /message?sessionId=`: the HTTP+SSE transport. Each
///   SSE connection is a session; messages posted for it are acknowledged
///   with `202 Accepted` and answered on the event stream, along with any
///   log and progress notifications the handler emits. The handshake and
///   the client's log level are tracked per session.
/// - `POST /mcp`: a stateless endpoint that answers a request in the HTTP
///   response body. No handshake is needed and handlers see a detached
///   context there.
///
/// # Example
///
/// ```no_run
/// use chutes_mcp_core::{protocol::Protocol, transport::{ServerSseTransport, Transport}};
///
/// async fn example() -> anyhow::Result<()> {
///     let protocol = Protocol::builder().build();
///     let transport = ServerSseTransport::new("127.0.0.1".to_string(), 8000, protocol);
///     transport.open().await
/// }
/// ```
#[derive(Clone)]
pub struct ServerSseTransport {
    protocol: Protocol,
    sessions: Arc<Mutex<HashMap<String, ServerSseTransportSession>>>,
    host: String,
    port: u16,
}

impl ServerSseTransport {
    pub fn new(host: String, port: u16, protocol: Protocol) -> Self {
        Self {
            protocol,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            host,
            port,
        }
    }

    async fn create_session(&self, session_id: String) -> ServerSseTransportSession {
        let (tx, rx) = mpsc::channel::<JsonRpcMessage>(SESSION_QUEUE_SIZE);
        let session = ServerSseTransportSession {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            protocol: self.protocol.new_session(),
        };
        self.sessions
            .lock()
            .await
            .insert(session_id, session.clone());
        session
    }

    async fn get_session(&self, session_id: &str) -> Option<ServerSseTransportSession> {
        let sessions = self.sessions.lock().await;
        sessions.get(session_id).cloned()
    }

    async fn remove_session(&self, session_id: &str) {
        if self.sessions.lock().await.remove(session_id).is_some() {
            tracing::info!("Session {} closed", session_id);
        }
    }
}

/// Registers the transport routes. The `ServerSseTransport` must be
/// available as `web::Data`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().limit(MAX_MESSAGE_BYTES))
        .route("/sse", web::get().to(sse_handler))
        .route("/message", web::post().to(message_handler))
        .route("/mcp", web::post().to(mcp_handler));
}

#[async_trait()]
impl Transport for ServerSseTransport {
    /// Binds the HTTP server and serves until it stops.
    async fn open(&self) -> Result<()> {
        let transport = self.clone();
        tracing::info!("Listening on http://{}:{}", self.host, self.port);
        let server = HttpServer::new(move || {
            App::new()
                .wrap(Logger::default())
                .app_data(web::Data::new(transport.clone()))
                .configure(configure)
        })
        .bind((self.host.clone(), self.port))?
        .run();

        server
            .await
            .map_err(|e| anyhow::anyhow!("Server error: {:?}", e))
    }

    async fn close(&self) -> Result<()> {
        self.sessions.lock().await.clear();
        Ok(())
    }

    // Messages arrive through the HTTP routes, never by polling the listener.
    async fn poll_message(&self) -> Result<Option<Message>> {
        Ok(None)
    }

    async fn send_notification(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<()> {
        let sessions: Vec<ServerSseTransportSession> =
            self.sessions.lock().await.values().cloned().collect();
        for session in sessions {
            session.send_notification(method, params.clone()).await?;
        }
        Ok(())
    }

    async fn send_response(
        &self,
        id: RequestId,
        _result: Option<serde_json::Value>,
        _error: Option<JsonRpcError>,
    ) -> Result<()> {
        Err(anyhow::anyhow!(
            "Response {} has no session to be delivered on",
            id
        ))
    }
}

/// Removes its session from the table when the SSE stream is dropped.
struct SessionGuard {
    transport: web::Data<ServerSseTransport>,
    session_id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let transport = self.transport.clone();
        let session_id = std::mem::take(&mut self.session_id);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move { transport.remove_session(&session_id).await });
        }
    }
}

/// Opens an SSE session.
///
/// The first event announces the endpoint the client posts its messages to.
pub async fn sse_handler(
    req: actix_web::HttpRequest,
    transport: web::Data<ServerSseTransport>,
) -> HttpResponse {
    let client_ip = req
        .peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let session_id = Uuid::new_v4().to_string();
    let session = transport.create_session(session_id.clone()).await;

    tracing::info!(
        "SSE connection established for {} with session_id {}",
        client_ip,
        session_id
    );

    let endpoint_info = format!(
        "event: endpoint\ndata: /message?sessionId={}\n\n",
        session_id
    );

    let transport_ping = transport.clone();
    let session_id_ping = session_id.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(KEEPALIVE_INTERVAL).await;
            let Some(session) = transport_ping.get_session(&session_id_ping).await else {
                break;
            };
            if let Err(e) = session.send_notification("ping", None).await {
                tracing::error!(
                    "Failed to send ping to session {}: {:?}",
                    session_id_ping,
                    e
                );
                break;
            }
        }
    });

    let guard = SessionGuard {
        transport: transport.clone(),
        session_id: session_id.clone(),
    };

    let stream = futures::stream::once(async move {
        Ok::<_, std::convert::Infallible>(web::Bytes::from(endpoint_info))
    })
    .chain(futures::stream::unfold(
        (session, guard),
        move |(session, guard)| async move {
            loop {
                match session.poll_message().await {
                    Ok(Some(msg)) => {
                        let json = match serde_json::to_string(&msg) {
                            Ok(json) => json,
                            Err(e) => {
                                tracing::error!("Failed to encode SSE message: {}", e);
                                continue;
                            }
                        };
                        tracing::debug!(
                            "Sending SSE message to session {}: {}",
                            guard.session_id,
                            json
                        );
                        let sse_data = format!("event: message\ndata: {}\n\n", json);
                        return Some((
                            Ok::<_, std::convert::Infallible>(web::Bytes::from(sse_data)),
                            (session, guard),
                        ));
                    }
                    Ok(None) => return None,
                    Err(e) => {
                        tracing::error!(
                            "Error polling message for session {}: {:?}",
                            guard.session_id,
                            e
                        );
                        return None;
                    }
                }
            }
        },
    ));

    HttpResponse::Ok()
        .append_header(("X-Session-Id", session_id))
        .append_header(("Cache-Control", "no-cache"))
        .content_type("text/event-stream")
        .streaming(stream)
}

#[derive(Deserialize)]
pub struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// Accepts a client message for an SSE session.
///
/// Requests are handled on their own task so a slow tool call neither
/// blocks the HTTP worker nor other sessions; the reply goes out on the
/// session's event stream.
pub async fn message_handler(
    query: Query<MessageQuery>,
    message: web::Json<Message>,
    transport: web::Data<ServerSseTransport>,
) -> HttpResponse {
    let Some(session_id) = &query.session_id else {
        return HttpResponse::BadRequest().body("Session ID not specified");
    };
    let Some(session) = transport.get_session(session_id).await else {
        return HttpResponse::NotFound().body(format!("Session {} not found", session_id));
    };

    match message.into_inner() {
        JsonRpcMessage::Request(request) => {
            tracing::debug!(
                "Received request from session {}: {:?}",
                session_id,
                request
            );
            let protocol = session.protocol.clone();
            let session_id = session_id.clone();
            tokio::spawn(async move {
                let peer: Arc<dyn Transport> = Arc::new(session.clone());
                let response = protocol.handle_request(request, Some(peer)).await;
                if let Err(e) = session
                    .send_response(response.id, response.result, response.error)
                    .await
                {
                    tracing::error!(
                        "Failed to send response to session {}: {:?}",
                        session_id,
                        e
                    );
                }
            });
            HttpResponse::Accepted().finish()
        }
        JsonRpcMessage::Response(response) => {
            session.protocol.handle_response(response).await;
            HttpResponse::Accepted().finish()
        }
        JsonRpcMessage::Notification(notification) => {
            tracing::debug!(
                "Received notification from session {}: {:?}",
                session_id,
                notification
            );
            session.protocol.handle_notification(notification).await;
            HttpResponse::Accepted().finish()
        }
    }
}

/// Stateless endpoint: answers a request in the HTTP response body.
pub async fn mcp_handler(
    message: web::Json<Message>,
    transport: web::Data<ServerSseTransport>,
) -> HttpResponse {
    let protocol = transport.protocol.stateless();
    match message.into_inner() {
        JsonRpcMessage::Request(request) => {
            tracing::debug!("Received request: {:?}", request);
            let response: JsonRpcResponse = protocol.handle_request(request, None).await;
            HttpResponse::Ok().json(response)
        }
        JsonRpcMessage::Response(response) => {
            protocol.handle_response(response).await;
            HttpResponse::Accepted().finish()
        }
        JsonRpcMessage::Notification(notification) => {
            protocol.handle_notification(notification).await;
            HttpResponse::Accepted().finish()
        }
    }
}

/// One connected SSE client: a queue of messages waiting to be streamed and
/// the protocol bound to this client's session.
#[derive(Clone)]
pub struct ServerSseTransportSession {
    rx: Arc<Mutex<mpsc::Receiver<Message>>>,
    tx: mpsc::Sender<Message>,
    protocol: Protocol,
}

#[async_trait()]
impl Transport for ServerSseTransportSession {
    async fn open(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn poll_message(&self) -> Result<Option<Message>> {
        let mut rx = self.rx.lock().await;
        Ok(rx.recv().await)
    }

    async fn send_notification(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<()> {
        let message = JsonRpcMessage::Notification(JsonRpcNotification {
            method: method.to_owned(),
            params,
            jsonrpc: Default::default(),
        });
        self.tx
            .send(message)
            .await
            .map_err(|e| anyhow::anyhow!("Send notification error: {:?}", e))
    }

    async fn send_response(
        &self,
        id: RequestId,
        result: Option<serde_json::Value>,
        error: Option<JsonRpcError>,
    ) -> Result<()> {
        let message = JsonRpcMessage::Response(JsonRpcResponse {
            id,
            result,
            error,
            jsonrpc: Default::default(),
        });
        self.tx
            .send(message)
            .await
            .map_err(|e| anyhow::anyhow!("Send response error: {:?}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ToolContext;
    use actix_web::{http::StatusCode, test};
    use serde_json::json;

    fn transport() -> ServerSseTransport {
        let protocol = Protocol::builder()
            .request_handler("ping", |_: serde_json::Value, _ctx: ToolContext| {
                Box::pin(async move { Ok(json!({})) })
            })
            .request_handler("announce", |_: serde_json::Value, ctx: ToolContext| {
                Box::pin(async move {
                    ctx.info("working").await;
                    Ok(json!({ "done": true }))
                })
            })
            .build();
        ServerSseTransport::new("127.0.0.1".to_string(), 0, protocol)
    }

    #[actix_web::test]
    async fn test_stateless_endpoint_answers_inline() {
        let transport = transport();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(transport))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/mcp")
            .set_json(json!({ "jsonrpc": "2.0", "id": "a1", "method": "ping" }))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, json!({ "jsonrpc": "2.0", "id": "a1", "result": {} }));

        let req = test::TestRequest::post()
            .uri("/mcp")
            .set_json(json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
    }

    #[actix_web::test]
    async fn test_large_messages_are_accepted() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(transport()))
                .configure(configure),
        )
        .await;

        // Well past actix-web's 2 MiB default, like a call carrying a photo.
        let image_b64 = "A".repeat(3 * 1024 * 1024);
        let req = test::TestRequest::post()
            .uri("/mcp")
            .set_json(json!({
                "jsonrpc": "2.0",
                "id": 9,
                "method": "ping",
                "params": { "image_b64s": [image_b64] }
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["result"], json!({}));
    }

    #[actix_web::test]
    async fn test_sessions_get_their_own_state() {
        let transport = transport();
        let first = transport.create_session("s-a".to_string()).await;
        let second = transport.create_session("s-b".to_string()).await;
        assert!(!Arc::ptr_eq(first.protocol.session(), second.protocol.session()));
        assert!(!first.protocol.session().is_initialized());
        assert!(transport.protocol.stateless().session().is_initialized());
    }

    #[actix_web::test]
    async fn test_message_requires_known_session() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(transport()))
                .configure(configure),
        )
        .await;

        let ping = json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" });
        let req = test::TestRequest::post()
            .uri("/message")
            .set_json(&ping)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/message?sessionId=nope")
            .set_json(&ping)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_session_receives_notifications_then_response() {
        let transport = transport();
        let session = transport.create_session("s-1".to_string()).await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(transport.clone()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/message?sessionId=s-1")
            .set_json(json!({ "jsonrpc": "2.0", "id": 5, "method": "announce" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        match session.poll_message().await.unwrap() {
            Some(JsonRpcMessage::Notification(n)) => {
                assert_eq!(n.method, "notifications/message");
                assert_eq!(n.params.unwrap()["data"], "working");
            }
            other => panic!("expected log notification, got {:?}", other),
        }
        match session.poll_message().await.unwrap() {
            Some(JsonRpcMessage::Response(r)) => {
                assert_eq!(r.id, RequestId::Number(5));
                assert_eq!(r.result, Some(json!({ "done": true })));
            }
            other => panic!("expected response, got {:?}", other),
        }
    }
}
