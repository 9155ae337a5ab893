use anyhow::{Context, Result};
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::{ArticleAlert, Notifier};
use crate::error::NotifyError;

pub struct EmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailSender {
    /// Reads `SMTP_HOST`, `SMTP_USER`, `SMTP_PASS`, `NOTIFY_EMAIL_FROM`, `NOTIFY_EMAIL_TO`.
    pub fn from_env() -> Result<Self> {
        fn req(name: &str) -> Result<String> {
            std::env::var(name).with_context(|| format!("{name} missing"))
        }
        let host = req("SMTP_HOST")?;
        let creds = Credentials::new(req("SMTP_USER")?, req("SMTP_PASS")?);
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
            .context("invalid SMTP_HOST")?
            .credentials(creds)
            .build();

        let from = req("NOTIFY_EMAIL_FROM")?
            .parse::<Mailbox>()
            .context("invalid NOTIFY_EMAIL_FROM")?;
        let to = req("NOTIFY_EMAIL_TO")?
            .parse::<Mailbox>()
            .context("invalid NOTIFY_EMAIL_TO")?;

        Ok(Self { mailer, from, to })
    }
}

#[async_trait::async_trait]
impl Notifier for EmailSender {
    async fn send(&self, alert: &ArticleAlert) -> Result<(), NotifyError> {
        let subject = format!(
            "[{}] {} ({})",
            alert.severity.tag(),
            alert.title,
            alert.score
        );
        let msg = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(alert.text())
            .map_err(|e| NotifyError::Email(e.to_string()))?;

        self.mailer
            .send(msg)
            .await
            .map_err(|e| NotifyError::Email(e.to_string()))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "email"
    }
}
