use crate::domain::ports::{DeliveryClient, DeliveryOutcome};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Delivers a rendered message to a chat-platform direct message or channel.
/// The platform's send API is reached through a generic bot-token endpoint;
/// concrete chat SDKs are out of scope (spec §1), so this adapter speaks the
/// lowest common denominator: POST `{chat_id, text}` to a configured base URL.
pub struct ChatDeliveryClient {
    client: Client,
    base_url: String,
    bot_token: String,
}

impl ChatDeliveryClient {
    pub fn new(base_url: String, bot_token: String, per_attempt_timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(per_attempt_timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url,
            bot_token,
        }
    }
}

#[async_trait]
impl DeliveryClient for ChatDeliveryClient {
    async fn deliver(&self, platform_identity: &str, rendered_message: &str) -> anyhow::Result<DeliveryOutcome> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.bot_token);
        let body = serde_json::json!({
            "chat_id": platform_identity,
            "text": rendered_message,
        });

        let response = self.client.post(&url).json(&body).send().await;

        match response {
            Ok(resp) if resp.status().is_success() => Ok(DeliveryOutcome::Ok),
            Ok(resp) if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = resp
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(1);
                Ok(DeliveryOutcome::Retry {
                    after: Duration::from_secs(retry_after),
                })
            }
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
