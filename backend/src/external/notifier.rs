//! Notification bus client
//!
//! Fire-and-forget event emission. Delivery failures are logged and never
//! surfaced to the request that triggered them.

use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

/// Notification bus client
#[derive(Clone)]
pub struct Notifier {
    client: Client,
    endpoint: Option<String>,
}

impl Notifier {
    pub fn new(endpoint: Option<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_default(),
            endpoint,
        }
    }

    /// Emit an event for a store. Returns immediately; the send happens in
    /// the background.
    pub fn emit(&self, store_id: Uuid, event: &str, payload: serde_json::Value) {
        let Some(endpoint) = self.endpoint.clone() else {
            return;
        };
        let client = self.client.clone();
        let event = event.to_string();

        tokio::spawn(async move {
            let body = json!({
                "store_id": store_id,
                "event": event,
                "payload": payload,
            });
            if let Err(e) = client.post(&endpoint).json(&body).send().await {
                tracing::warn!(event = %event, "notification emit failed: {}", e);
            }
        });
    }
}
