//! Sends one synthetic article through the configured notification sinks.
//! With no sinks configured the alert is only logged.

use chrono::Utc;
use regional_newsbot::config::AppConfig;
use regional_newsbot::notify::NotifyOutcome;
use regional_newsbot::{NotifierMux, StoredArticle};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let cfg = AppConfig::load_default()?;
    let mux = NotifierMux::from_config(&cfg.notify);

    for score in [65, 75, 95] {
        let article = StoredArticle {
            link: format!("https://example.invalid/probe-{score}"),
            title: format!("Varslingstest ({score})"),
            summary: String::new(),
            source: "notify-probe".into(),
            published: Utc::now().to_rfc2822(),
            discovered_at: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            matched_keyword: "Skien".into(),
            ai_score: score,
            ai_reason: "Testvarsel".into(),
            status: "new".into(),
        };
        match mux.notify(&article).await {
            NotifyOutcome::BelowThreshold => println!("score {score}: below threshold"),
            NotifyOutcome::Dispatched {
                severity,
                delivered,
                failed,
            } => println!(
                "score {score}: {} delivered={delivered} failed={failed}",
                severity.tag()
            ),
        }
    }
    Ok(())
}
