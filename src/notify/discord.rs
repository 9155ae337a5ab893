use std::time::Duration;

use reqwest::Client;
use serde::Serialize;

use super::{ArticleAlert, Notifier, Severity};
use crate::error::NotifyError;

const COLOR_BREAKING: u32 = 0xE0_24_24;
const COLOR_IMPORTANT: u32 = 0xF0_9A_1A;

#[derive(Clone)]
pub struct DiscordNotifier {
    webhook: String,
    client: Client,
    timeout: Duration,
}

impl DiscordNotifier {
    pub fn new(webhook: String) -> Self {
        Self {
            webhook,
            client: Client::new(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait::async_trait]
impl Notifier for DiscordNotifier {
    async fn send(&self, alert: &ArticleAlert) -> Result<(), NotifyError> {
        let payload = DiscordWebhookPayload::from_alert(alert);
        let rsp = self
            .client
            .post(&self.webhook)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await?;
        if let Err(e) = rsp.error_for_status_ref() {
            return Err(NotifyError::Status(e.status().map(|s| s.as_u16()).unwrap_or(0)));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}

#[derive(Serialize)]
struct DiscordEmbed {
    title: String,
    url: String,
    description: String,
    color: u32,
}

#[derive(Serialize)]
struct DiscordWebhookPayload {
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

impl DiscordWebhookPayload {
    fn from_alert(alert: &ArticleAlert) -> Self {
        let (prefix, color) = match alert.severity {
            Severity::Breaking => ("BREAKING", COLOR_BREAKING),
            Severity::Important => ("Viktig", COLOR_IMPORTANT),
        };
        Self {
            content: None,
            embeds: vec![DiscordEmbed {
                title: format!("{prefix}: {}", alert.title),
                url: alert.link.clone(),
                description: format!(
                    "**Score:** {}\n**Begrunnelse:** {}\n**Kilde:** {}",
                    alert.score, alert.justification, alert.source
                ),
                color,
            }],
        }
    }
}
