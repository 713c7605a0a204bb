use async_trait::async_trait;
use azops_core::notify::{Notification, Notifier, NotifyError};
use reqwest::Client;
use tracing::debug;

/// POSTs each notification as JSON, e.g. to a Teams or Slack incoming-webhook
/// relay.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self { client, url: url.into() }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|error| NotifyError::Delivery(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Delivery(format!("webhook answered {status}")));
        }
        debug!(
            event_name = "notification.webhook_delivered",
            request_id = %notification.request_id,
            kind = notification.kind.as_str(),
            "notification posted to webhook"
        );
        Ok(())
    }
}
