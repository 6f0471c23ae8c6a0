use crate::domain::ports::{DeliveryClient, DeliveryOutcome};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Delivers a rendered event payload to a subscriber-owned webhook URL.
/// `platform_identity` is the destination URL itself for this kind.
pub struct WebhookDeliveryClient {
    client: Client,
}

impl WebhookDeliveryClient {
    pub fn new(per_attempt_timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(per_attempt_timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }
}

#[async_trait]
impl DeliveryClient for WebhookDeliveryClient {
    async fn deliver(&self, platform_identity: &str, rendered_message: &str) -> anyhow::Result<DeliveryOutcome> {
        let response = self
            .client
            .post(platform_identity)
            .header("Content-Type", "application/json")
            .body(rendered_message.to_string())
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => Ok(DeliveryOutcome::Ok),
            Ok(resp) if resp.status().is_server_error() => Ok(DeliveryOutcome::Retry {
                after: Duration::from_secs(1),
            }),
            Ok(_) => Ok(DeliveryOutcome::Drop),
            Err(_) => Ok(DeliveryOutcome::Retry {
                after: Duration::from_secs(1),
            }),
        }
    }
}
