//! Connection-scoped protocol state.
//!
//! Each SSE connection gets its own `Session`, so one client's handshake or
//! `logging/setLevel` never leaks into another's. The stateless `POST /mcp`
//! endpoint uses a throwaway session per request that starts out
//! initialized.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::RwLock;

use crate::types::LoggingLevel;

#[derive(Debug, Default)]
pub struct Session {
    initialized: AtomicBool,
    log_level: RwLock<LoggingLevel>,
}

impl Session {
    /// A session that has not seen `notifications/initialized` yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// A session with no handshake, for one-shot requests.
    pub fn stateless() -> Self {
        Self {
            initialized: AtomicBool::new(true),
            log_level: RwLock::default(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn mark_initialized(&self) {
        self.initialized.store(true, Ordering::Release);
    }

    /// The minimum level of log messages forwarded to this client.
    pub async fn log_level(&self) -> LoggingLevel {
        *self.log_level.read().await
    }

    pub async fn set_log_level(&self, level: LoggingLevel) {
        *self.log_level.write().await = level;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sessions_start_apart() {
        let fresh = Session::new();
        assert!(!fresh.is_initialized());
        assert_eq!(fresh.log_level().await, LoggingLevel::Info);

        fresh.mark_initialized();
        fresh.set_log_level(LoggingLevel::Error).await;
        assert!(fresh.is_initialized());
        assert_eq!(fresh.log_level().await, LoggingLevel::Error);

        assert!(Session::stateless().is_initialized());
    }
}
