//! Regional newsbot binary entrypoint.
//! Opens the article store, wires the pipeline, starts the interval driver
//! and serves the HTTP surface.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use regional_newsbot::api::{self, AppState};
use regional_newsbot::config::AppConfig;
use regional_newsbot::metrics::Metrics;
use regional_newsbot::pipeline::Pipeline;
use regional_newsbot::scheduler::spawn_cycle_scheduler;
use regional_newsbot::store::SqliteArticleStore;

fn flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|v| v == "1")
}

/// Compact logs by default; JSON lines with `NEWSBOT_LOG_JSON=1`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("regional_newsbot=info,warn"));

    let registry = tracing_subscriber::registry().with(filter);
    if flag("NEWSBOT_LOG_JSON") {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load_default().context("loading configuration")?;

    // Store init is the only fatal failure class.
    let store = SqliteArticleStore::open(&cfg.store.path)
        .await
        .with_context(|| format!("opening article store at {}", cfg.store.path))?;

    let metrics = Metrics::init()?;

    let pipeline = Arc::new(
        Pipeline::from_config(&cfg, Arc::new(store)).with_anonymized_logs(flag("NEWSBOT_LOG_ANON")),
    );
    tracing::info!(
        feeds = cfg.sources.feeds.len(),
        bulletin = cfg.sources.bulletin.enabled,
        keywords = %pipeline.keywords().to_delimited(),
        threshold = cfg.notify.threshold,
        "pipeline ready"
    );

    if cfg.schedule.interval_secs > 0 {
        spawn_cycle_scheduler(pipeline.clone(), Duration::from_secs(cfg.schedule.interval_secs));
    } else {
        tracing::info!("interval driver disabled; cycles run on POST /cycle only");
    }

    let app = api::router(AppState::new(pipeline)).merge(metrics.router());
    let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("binding {}", cfg.server.bind))?;
    tracing::info!(bind = %cfg.server.bind, "listening");
    axum::serve(listener, app).await.context("http server")?;
    Ok(())
}
