// ABOUTME: Notification sink for System A - posts JSON payloads to per-channel webhook URLs
// ABOUTME: Transport failures are logged and reported as false, never raised

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use super::RemoteSink;
use crate::model::{ChangeKind, Channel, EntityKind};

/// Destination URL per notification channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookUrls {
    pub person_new: Option<String>,
    pub person_update: Option<String>,
    pub company_new: Option<String>,
    pub company_update: Option<String>,
}

impl WebhookUrls {
    pub fn for_channel(&self, channel: Channel) -> Option<&str> {
        let url = match (channel.kind, channel.change) {
            (EntityKind::Person, ChangeKind::New) => &self.person_new,
            (EntityKind::Person, ChangeKind::Update) => &self.person_update,
            (EntityKind::Company, ChangeKind::New) => &self.company_new,
            (EntityKind::Company, ChangeKind::Update) => &self.company_update,
        };
        url.as_deref().filter(|u| !u.trim().is_empty())
    }
}

pub struct WebhookSink {
    client: Client,
    urls: WebhookUrls,
}

impl WebhookSink {
    pub fn new(urls: WebhookUrls, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client, urls })
    }
}

#[async_trait]
impl RemoteSink for WebhookSink {
    async fn notify(&self, channel: Channel, payload: &Value) -> bool {
        let Some(url) = self.urls.for_channel(channel) else {
            tracing::warn!("[Webhook] No URL configured for channel {}", channel);
            return false;
        };

        match self.client.post(url).json(payload).send().await {
            Ok(response) => {
                let status = response.status();
                tracing::info!(
                    "[Webhook] Sent {} to {} - Status: {}",
                    channel,
                    redact_url(url),
                    status
                );
                status.is_success()
            }
            Err(e) => {
                tracing::warn!(
                    "[Webhook] Error sending {} to {}: {}",
                    channel,
                    redact_url(url),
                    e
                );
                false
            }
        }
    }

    fn is_configured(&self, channel: Channel) -> bool {
        self.urls.for_channel(channel).is_some()
    }
}

/// Webhook URLs embed secrets in their path; only log scheme and host.
pub fn redact_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => match parsed.host_str() {
            Some(host) => format!("{}://{}/***", parsed.scheme(), host),
            None => "***".to_string(),
        },
        Err(_) => "***".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn urls() -> WebhookUrls {
        WebhookUrls {
            person_new: Some("https://hooks.example.com/p/new".to_string()),
            person_update: Some("  ".to_string()),
            company_new: None,
            company_update: Some("https://hooks.example.com/c/upd".to_string()),
        }
    }

    #[test]
    fn test_channel_routing() {
        let urls = urls();
        assert_eq!(
            urls.for_channel(Channel::new(EntityKind::Person, ChangeKind::New)),
            Some("https://hooks.example.com/p/new")
        );
        assert!(urls
            .for_channel(Channel::new(EntityKind::Person, ChangeKind::Update))
            .is_none());
        assert!(urls
            .for_channel(Channel::new(EntityKind::Company, ChangeKind::New))
            .is_none());
        assert!(urls
            .for_channel(Channel::new(EntityKind::Company, ChangeKind::Update))
            .is_some());
    }

    #[test]
    fn test_redact_url() {
        assert_eq!(
            redact_url("https://hooks.example.com/hooks/catch/123/abc"),
            "https://hooks.example.com/***"
        );
        assert_eq!(redact_url("not a url"), "***");
    }

    #[tokio::test]
    async fn test_unconfigured_channel_returns_false() {
        let sink = WebhookSink::new(WebhookUrls::default(), Duration::from_secs(1)).unwrap();
        let channel = Channel::new(EntityKind::Company, ChangeKind::New);
        assert!(!sink.is_configured(channel));
        assert!(!sink.notify(channel, &json!({"record_id": "c1"})).await);
    }

    #[tokio::test]
    async fn test_unreachable_destination_returns_false() {
        let sink = WebhookSink::new(
            WebhookUrls {
                person_new: Some("http://127.0.0.1:9/unreachable".to_string()),
                ..Default::default()
            },
            Duration::from_secs(2),
        )
        .unwrap();
        let channel = Channel::new(EntityKind::Person, ChangeKind::New);
        assert!(!sink.notify(channel, &json!({"record_id": "p1"})).await);
    }
}
