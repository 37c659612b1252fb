//! Notification Sinks
//!
//! Concrete [`ChangeNotifier`] adapters: structured logs, a JSON webhook
//! (Slack-compatible `{"text": ...}` body) and an in-memory collector.

use super::events::ChangeEvent;
use crate::domain::ports::ChangeNotifier;
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tracing::info;

// =============================================================================
// Log Sink
// =============================================================================

/// Writes each event to the log at info level
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl ChangeNotifier for LogNotifier {
    async fn notify(&self, event: &ChangeEvent) -> Result<()> {
        info!(
            kind = %event.subject.kind,
            id = %event.subject.id,
            created = event.created,
            "{}",
            event.render()
        );
        Ok(())
    }

    fn sink_name(&self) -> &str {
        "log"
    }
}

// =============================================================================
// Webhook Sink
// =============================================================================

/// Posts each event as `{"text": "..."}` to a webhook URL
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Configuration(format!("Invalid webhook client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ChangeNotifier for WebhookNotifier {
    async fn notify(&self, event: &ChangeEvent) -> Result<()> {
        let body = serde_json::json!({ "text": event.render() });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::NotificationDelivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::NotificationDelivery(format!(
                "webhook returned {}",
                status
            )));
        }

        Ok(())
    }

    fn sink_name(&self) -> &str {
        "webhook"
    }
}

// =============================================================================
// Memory Sink
// =============================================================================

/// Keeps every delivered event in memory, for embedders that render events
/// themselves
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    events: Mutex<Vec<ChangeEvent>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events delivered so far, in delivery order
    pub fn events(&self) -> Vec<ChangeEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Remove and return everything collected so far
    pub fn drain(&self) -> Vec<ChangeEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

#[async_trait]
impl ChangeNotifier for MemoryNotifier {
    async fn notify(&self, event: &ChangeEvent) -> Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }

    fn sink_name(&self) -> &str {
        "memory"
    }
}
