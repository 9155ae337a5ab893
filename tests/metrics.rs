// tests/metrics.rs
//
// Prometheus exposition after one cycle. Installs the global recorder, so
// this binary holds a single test.

use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use regional_newsbot::ingest::providers::rss::RssFeedProvider;
use regional_newsbot::metrics::Metrics;
use regional_newsbot::notify::{AlertGate, NotifierMux};
use regional_newsbot::pipeline::Pipeline;
use regional_newsbot::scoring::DisabledScorer;
use regional_newsbot::store::SqliteArticleStore;

const FEED: &str = r#"<rss version="2.0"><channel><title>NRK</title>
  <item><title>Stengt vei i Skien</title><link>https://www.nrk.no/vei/1</link></item>
  <item><title>Nytt fra Oslo</title><link>https://www.nrk.no/oslo/2</link></item>
</channel></rss>"#;

#[tokio::test]
async fn metrics_endpoint_contains_pipeline_series() {
    let metrics = Metrics::init().expect("install recorder");

    let store = Arc::new(SqliteArticleStore::in_memory().await.unwrap());
    let pipeline = Pipeline::new(store, Arc::new(DisabledScorer), NotifierMux::new(AlertGate::default()))
        .with_feed(Arc::new(RssFeedProvider::from_fixture("https://www.nrk.no/rss", FEED)));
    let report = pipeline.run_cycle().await;
    assert_eq!(report.new_items, 1);

    let resp = metrics
        .router()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let text = String::from_utf8(body::to_bytes(resp.into_body(), 1 << 20).await.unwrap().to_vec()).unwrap();

    for series in [
        "pipeline_cycles_total",
        "pipeline_new_items_total",
        "pipeline_filtered_total",
        "scoring_fallbacks_total",
        "ingest_events_total",
    ] {
        assert!(text.contains(series), "missing {series} in:\n{text}");
    }
    assert!(text.contains(r#"stage="keyword""#));
}
