use crate::db::{self, users, Database};
use crate::errors::AppResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
}

impl PushMessage {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }
}

/// Topic every device subscribes to for organisation-wide announcements.
pub const DEFAULT_BROADCAST_TOPIC: &str = "peerly";

/// Delivery backend for device push messages.
pub trait PushSender: Send + Sync {
    fn send(&self, tokens: &[String], message: &PushMessage) -> AppResult<()>;

    fn send_to_topic(&self, topic: &str, message: &PushMessage) -> AppResult<()>;
}

/// Logs each delivery instead of contacting a push provider.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPushSender;

impl PushSender for TracingPushSender {
    fn send(&self, tokens: &[String], message: &PushMessage) -> AppResult<()> {
        let payload = serde_json::to_string(message)?;
        tracing::info!(devices = tokens.len(), %payload, "push notification delivered");
        Ok(())
    }

    fn send_to_topic(&self, topic: &str, message: &PushMessage) -> AppResult<()> {
        let payload = serde_json::to_string(message)?;
        tracing::info!(topic, %payload, "push notification broadcast");
        Ok(())
    }
}

/// Fire-and-forget delivery to registered devices or to the broadcast topic.
#[derive(Clone)]
pub struct Notifier {
    db: Arc<Database>,
    sender: Arc<dyn PushSender>,
    topic: Arc<str>,
}

impl Notifier {
    pub fn new(db: Arc<Database>, sender: Arc<dyn PushSender>) -> Self {
        Self {
            db,
            sender,
            topic: Arc::from(DEFAULT_BROADCAST_TOPIC),
        }
    }

    pub fn with_topic(mut self, topic: &str) -> Self {
        self.topic = Arc::from(topic);
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Spawns delivery on the current tokio runtime and returns immediately.
    /// Failures are logged and never reach the caller.
    pub fn dispatch(&self, user_ids: Vec<i64>, message: PushMessage) -> Option<JoinHandle<()>> {
        let db = self.db.clone();
        let sender = self.sender.clone();
        let title = message.title.clone();
        spawn_delivery(title, move || {
            let tokens = db.run(|conn| users::list_device_tokens(conn, &user_ids))?;
            if tokens.is_empty() {
                return Ok(0);
            }
            sender.send(&tokens, &message)?;
            Ok(tokens.len())
        })
    }

    /// Announces `message` to everyone subscribed to the broadcast topic.
    pub fn broadcast(&self, message: PushMessage) -> Option<JoinHandle<()>> {
        let sender = self.sender.clone();
        let topic = self.topic.clone();
        let title = message.title.clone();
        spawn_delivery(title, move || {
            sender.send_to_topic(&topic, &message)?;
            Ok(1)
        })
    }
}

fn spawn_delivery<F>(title: String, deliver: F) -> Option<JoinHandle<()>>
where
    F: FnOnce() -> AppResult<usize> + Send + 'static,
{
    let handle = match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle,
        Err(error) => {
            tracing::warn!(title = %title, "skipping notification without a runtime: {}", error);
            return None;
        }
    };
    Some(handle.spawn(async move {
        match db::run_blocking(deliver).await {
            Ok(0) => tracing::debug!(title = %title, "no device tokens registered for recipients"),
            Ok(deliveries) => tracing::debug!(title = %title, deliveries, "notification dispatched"),
            Err(error) => tracing::warn!(title = %title, "notification delivery failed: {}", error),
        }
    }))
}
