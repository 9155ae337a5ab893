use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Call once per process.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        describe();
        Ok(Self { handle })
    }

    /// Router exposing `/metrics` in the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

fn describe() {
    describe_counter!("pipeline_cycles_total", "Completed ingestion cycles");
    describe_counter!("pipeline_new_items_total", "Articles stored by cycles");
    describe_counter!("pipeline_filtered_total", "Candidates stopped before storage, by stage");
    describe_counter!("pipeline_source_errors_total", "Sources skipped after a fetch failure");
    describe_counter!("scoring_calls_total", "Relevance scoring requests");
    describe_counter!("scoring_fallbacks_total", "Scores replaced by a fallback, by reason");
    describe_counter!("notify_sent_total", "Alerts delivered, by sink");
    describe_counter!("notify_errors_total", "Alert deliveries that failed, by sink");
    describe_counter!("ingest_events_total", "Candidates produced by source adapters");
    describe_counter!("ingest_provider_errors_total", "Bulletin categories skipped");
    describe_histogram!("ingest_parse_ms", Unit::Milliseconds, "Feed parse time");
}
