use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use crate::error::AppError;

/// Per-token notification channels between session actors.
///
/// Publishing is fire-and-forget: a payload for a token nobody is bound to
/// is dropped.
#[async_trait::async_trait]
pub trait NotificationBus: Send + Sync {
    /// Returns whether a live subscriber accepted the payload.
    async fn publish(&self, token: &str, payload: &str) -> Result<bool, AppError>;
    async fn subscribe(&self, token: &str) -> mpsc::UnboundedReceiver<String>;
    async fn unsubscribe(&self, token: &str);
}

/// In-process bus backed by unbounded mpsc channels.
#[derive(Clone, Default)]
pub struct LocalBus {
    subscribers: Arc<RwLock<HashMap<String, mpsc::UnboundedSender<String>>>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

#[async_trait::async_trait]
impl NotificationBus for LocalBus {
    async fn publish(&self, token: &str, payload: &str) -> Result<bool, AppError> {
        let sender = self.subscribers.read().await.get(token).cloned();
        match sender {
            Some(tx) => {
                if tx.send(payload.to_string()).is_err() {
                    tracing::debug!(token, "subscriber gone, dropping notification");
                    self.subscribers.write().await.remove(token);
                    return Ok(false);
                }
                Ok(true)
            }
            None => {
                tracing::debug!(token, "no subscriber bound, dropping notification");
                Ok(false)
            }
        }
    }

    async fn subscribe(&self, token: &str) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        // Rebinding a token replaces the previous receiver.
        self.subscribers.write().await.insert(token.to_string(), tx);
        rx
    }

    async fn unsubscribe(&self, token: &str) {
        self.subscribers.write().await.remove(token);
    }
}
