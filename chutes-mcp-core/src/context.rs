//! # Request Context
//!
//! `ToolContext` is the optional capability a handler receives for talking
//! back to the client while a request is in flight: log messages
//! (`notifications/message`) and progress updates (`notifications/progress`).
//!
//! A context is either attached to a peer transport or detached. Every
//! method is a no-op towards the client when detached, so handlers never
//! need to check which one they got.

use std::sync::Arc;

use crate::{
    session::Session,
    transport::Transport,
    types::{LoggingLevel, LoggingMessageNotification, ProgressNotification},
};

const LOGGER_NAME: &str = "chutes-mcp";

/// Client-facing logging and progress capability for a single request.
#[derive(Clone, Default)]
pub struct ToolContext {
    peer: Option<Arc<dyn Transport>>,
    min_level: LoggingLevel,
    progress_token: Option<serde_json::Value>,
    session: Arc<Session>,
}

impl ToolContext {
    /// Creates a context that is not connected to any client.
    pub fn detached() -> Self {
        Self::default()
    }

    /// Creates a context that forwards messages at or above `min_level` to `peer`.
    pub fn new(peer: Option<Arc<dyn Transport>>, min_level: LoggingLevel) -> Self {
        Self {
            peer,
            min_level,
            progress_token: None,
            session: Arc::default(),
        }
    }

    /// Binds the context to the session the request arrived on.
    pub fn with_session(mut self, session: Arc<Session>) -> Self {
        self.session = session;
        self
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Attaches the progress token of the request being served.
    pub fn with_progress_token(mut self, token: Option<serde_json::Value>) -> Self {
        self.progress_token = token;
        self
    }

    /// Whether messages reach a client.
    pub fn is_attached(&self) -> bool {
        self.peer.is_some()
    }

    /// Whether progress reports reach a client.
    pub fn reports_progress(&self) -> bool {
        self.peer.is_some() && self.progress_token.is_some()
    }

    pub async fn debug(&self, message: impl Into<String>) {
        self.log(LoggingLevel::Debug, message.into()).await
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.log(LoggingLevel::Info, message.into()).await
    }

    pub async fn warning(&self, message: impl Into<String>) {
        self.log(LoggingLevel::Warning, message.into()).await
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.log(LoggingLevel::Error, message.into()).await
    }

    /// Logs `message` locally and, when attached and not filtered out by the
    /// client's level, forwards it as a `notifications/message`.
    pub async fn log(&self, level: LoggingLevel, message: String) {
        match level {
            LoggingLevel::Debug => tracing::debug!("{}", message),
            LoggingLevel::Info | LoggingLevel::Notice => tracing::info!("{}", message),
            LoggingLevel::Warning => tracing::warn!("{}", message),
            _ => tracing::error!("{}", message),
        }

        let Some(peer) = &self.peer else {
            return;
        };
        if level < self.min_level {
            return;
        }

        let params = LoggingMessageNotification {
            level,
            logger: Some(LOGGER_NAME.to_string()),
            data: serde_json::Value::String(message),
        };
        let params = match serde_json::to_value(params) {
            Ok(params) => params,
            Err(e) => {
                tracing::debug!("Failed to encode log notification: {}", e);
                return;
            }
        };
        if let Err(e) = peer
            .send_notification("notifications/message", Some(params))
            .await
        {
            tracing::debug!("Failed to forward log message to client: {:?}", e);
        }
    }

    /// Sends a `notifications/progress` update if the client asked for them.
    pub async fn report_progress(&self, progress: f64, total: Option<f64>, message: Option<&str>) {
        let (Some(peer), Some(token)) = (&self.peer, &self.progress_token) else {
            return;
        };

        let params = ProgressNotification {
            progress_token: token.clone(),
            progress,
            total,
            message: message.map(str::to_string),
        };
        let params = match serde_json::to_value(params) {
            Ok(params) => params,
            Err(e) => {
                tracing::debug!("Failed to encode progress notification: {}", e);
                return;
            }
        };
        if let Err(e) = peer
            .send_notification("notifications/progress", Some(params))
            .await
        {
            tracing::debug!("Failed to send progress to client: {:?}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{JsonRpcError, Message, RequestId};
    use anyhow::Result;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingPeer {
        sent: Mutex<Vec<(String, Option<serde_json::Value>)>>,
    }

    #[async_trait]
    impl Transport for RecordingPeer {
        async fn open(&self) -> Result<()> {
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }

        async fn poll_message(&self) -> Result<Option<Message>> {
            Ok(None)
        }

        async fn send_notification(
            &self,
            method: &str,
            params: Option<serde_json::Value>,
        ) -> Result<()> {
            self.sent.lock().await.push((method.to_string(), params));
            Ok(())
        }

        async fn send_response(
            &self,
            _id: RequestId,
            _result: Option<serde_json::Value>,
            _error: Option<JsonRpcError>,
        ) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_detached_context_is_silent() {
        let ctx = ToolContext::detached();
        assert!(!ctx.is_attached());
        ctx.info("nobody listens").await;
        ctx.report_progress(1.0, Some(2.0), None).await;
    }

    #[tokio::test]
    async fn test_messages_below_client_level_are_dropped() {
        let peer = Arc::new(RecordingPeer::default());
        let ctx = ToolContext::new(Some(peer.clone()), LoggingLevel::Warning);

        ctx.debug("too chatty").await;
        ctx.info("still too chatty").await;
        ctx.error("upload failed").await;

        let sent = peer.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "notifications/message");
        let params = sent[0].1.as_ref().unwrap();
        assert_eq!(params["level"], "error");
        assert_eq!(params["data"], "upload failed");
    }

    #[tokio::test]
    async fn test_progress_requires_token() {
        let peer = Arc::new(RecordingPeer::default());
        let ctx = ToolContext::new(Some(peer.clone()), LoggingLevel::Info);
        ctx.report_progress(1.0, Some(3.0), None).await;
        assert!(peer.sent.lock().await.is_empty());

        let ctx = ctx.with_progress_token(Some(serde_json::json!("tok-1")));
        assert!(ctx.reports_progress());
        ctx.report_progress(2.0, Some(3.0), Some("payload received"))
            .await;

        let sent = peer.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "notifications/progress");
        let params = sent[0].1.as_ref().unwrap();
        assert_eq!(params["progressToken"], "tok-1");
        assert_eq!(params["progress"], 2.0);
        assert_eq!(params["total"], 3.0);
        assert_eq!(params["message"], "payload received");
    }
}
