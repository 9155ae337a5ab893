use std::time::Duration;

use reqwest::Client;

use super::{ArticleAlert, Notifier};
use crate::error::NotifyError;

/// Generic text webhook: POSTs `{"text": ..., "severity": ...}`.
pub struct WebhookNotifier {
    url: String,
    client: Client,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            url,
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
impl Notifier for WebhookNotifier {
    async fn send(&self, alert: &ArticleAlert) -> Result<(), NotifyError> {
        let body = serde_json::json!({
            "text": alert.text(),
            "severity": alert.severity.tag(),
            "score": alert.score,
            "link": alert.link,
        });

        let rsp = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;
        if !rsp.status().is_success() {
            return Err(NotifyError::Status(rsp.status().as_u16()));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}
