// tests/pipeline_e2e.rs
//
// Full cycles against fixtures: in-memory SQLite, mock scorer, recording
// notifier. No network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use regional_newsbot::error::{NotifyError, SourceError, StoreError};
use regional_newsbot::filter::{KeywordMatcher, KeywordSet};
use regional_newsbot::ingest::providers::bulletin::{BulletinCategory, BulletinConfig, BulletinProvider};
use regional_newsbot::ingest::providers::rss::RssFeedProvider;
use regional_newsbot::notify::{AlertGate, ArticleAlert, Notifier, NotifierMux, Severity};
use regional_newsbot::pipeline::{CyclePhase, ItemOutcome, Pipeline};
use regional_newsbot::scoring::prompt::PromptContext;
use regional_newsbot::scoring::provider::MockProvider;
use regional_newsbot::scoring::{
    DisabledScorer, LlmScorer, RelevanceScorer, ScoreVerdict, UNCONFIGURED_REASON,
};
use regional_newsbot::store::{
    ArticleRepository, ArticleStats, InsertOutcome, SqliteArticleStore, StoredArticle,
};
use regional_newsbot::{CandidateItem, SourceProvider};

const SINGLE_SKIEN: &str = include_str!("fixtures/single_skien.xml");
const MIXED_FEED: &str = include_str!("fixtures/telemark_feed.xml");
const BULLETIN_PAGE: &str = include_str!("fixtures/bulletin_page.html");

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
}

/* ----------------------------
Test doubles
---------------------------- */

struct CountingScorer {
    inner: Box<dyn RelevanceScorer>,
    calls: AtomicUsize,
}

impl CountingScorer {
    fn answering(answer: &str) -> Arc<Self> {
        Arc::new(Self {
            inner: Box::new(LlmScorer::new(
                MockProvider::new(answer),
                PromptContext::default(),
                Duration::from_secs(1),
            )),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelevanceScorer for CountingScorer {
    async fn score(&self, title: &str, body: &str, keyword: &str) -> ScoreVerdict {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Keeps the dedup → insert window open in `concurrent_items_for_one_link_score_once`.
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.inner.score(title, body, keyword).await
    }

    fn provider_name(&self) -> &'static str {
        "counting"
    }
}

#[derive(Default)]
struct RecordingSink {
    alerts: Mutex<Vec<ArticleAlert>>,
}

#[async_trait]
impl Notifier for RecordingSink {
    async fn send(&self, alert: &ArticleAlert) -> Result<(), NotifyError> {
        self.alerts.lock().push(alert.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

struct FailingSource;

#[async_trait]
impl SourceProvider for FailingSource {
    async fn fetch_latest(&self) -> Result<Vec<CandidateItem>, SourceError> {
        Err(SourceError::Parse {
            url: "https://broken.test/rss".into(),
            reason: "unexpected EOF".into(),
        })
    }

    fn name(&self) -> &str {
        "broken"
    }
}

struct FixedSource(Vec<CandidateItem>);

#[async_trait]
impl SourceProvider for FixedSource {
    async fn fetch_latest(&self) -> Result<Vec<CandidateItem>, SourceError> {
        Ok(self.0.clone())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// SQLite store that fails inserts (or dedup reads) for links containing a marker.
struct FlakyRepo {
    inner: SqliteArticleStore,
    fail_insert: &'static str,
    fail_exists: &'static str,
}

#[async_trait]
impl ArticleRepository for FlakyRepo {
    async fn exists(&self, link: &str) -> Result<bool, StoreError> {
        if !self.fail_exists.is_empty() && link.contains(self.fail_exists) {
            return Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut));
        }
        self.inner.exists(link).await
    }

    async fn insert(&self, a: &StoredArticle) -> Result<InsertOutcome, StoreError> {
        if !self.fail_insert.is_empty() && a.link.contains(self.fail_insert) {
            return Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut));
        }
        self.inner.insert(a).await
    }

    async fn query_all(&self) -> Result<Vec<StoredArticle>, StoreError> {
        self.inner.query_all().await
    }

    async fn stats(&self, day: &str) -> Result<ArticleStats, StoreError> {
        self.inner.stats(day).await
    }

    async fn reset(&self) -> Result<(), StoreError> {
        self.inner.reset().await
    }
}

struct Harness {
    pipeline: Pipeline,
    store: Arc<dyn ArticleRepository>,
    scorer: Arc<CountingScorer>,
    sink: Arc<RecordingSink>,
}

async fn harness_with(store: Arc<dyn ArticleRepository>, answer: &str) -> Harness {
    let scorer = CountingScorer::answering(answer);
    let sink = Arc::new(RecordingSink::default());
    let notifier = NotifierMux::new(AlertGate::default()).with_sink(sink.clone());
    let pipeline = Pipeline::new(store.clone(), scorer.clone(), notifier);
    Harness {
        pipeline,
        store,
        scorer,
        sink,
    }
}

async fn harness(answer: &str) -> Harness {
    let store: Arc<dyn ArticleRepository> = Arc::new(SqliteArticleStore::in_memory().await.unwrap());
    harness_with(store, answer).await
}

fn feed(xml: &str) -> Arc<dyn SourceProvider> {
    Arc::new(RssFeedProvider::from_fixture("https://www.nrk.no/vestfoldogtelemark/siste.rss", xml))
}

/* ----------------------------
Scenarios
---------------------------- */

#[tokio::test]
async fn skien_fire_is_stored_and_alerted_as_breaking() {
    let mut h = harness("Score: 95 Begrunnelse: Stor lokal hendelse").await;
    h.pipeline = h.pipeline.with_feed(feed(SINGLE_SKIEN));

    let report = h.pipeline.run_cycle_at(now()).await;
    assert_eq!(report.new_items, 1);
    assert_eq!(report.notified, 1);
    assert_eq!(report.failed_sources, 0);

    let rows = h.store.query_all().await.unwrap();
    assert_eq!(rows.len(), 1);
    let a = &rows[0];
    assert_eq!(a.title, "Brann i Skien sentrum");
    assert_eq!(a.ai_score, 95);
    assert_eq!(a.ai_reason, "Stor lokal hendelse");
    assert_eq!(a.matched_keyword, "Skien");
    assert_eq!(a.source, "NRK");
    assert_eq!(a.published, "Fri, 16 Oct 2026 08:00:00 +0200");
    assert_eq!(a.status, "new");

    let alerts = h.sink.alerts.lock().clone();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, Severity::Breaking);
    assert_eq!(alerts[0].link, a.link);
}

#[tokio::test]
async fn second_cycle_is_a_no_op() {
    let mut h = harness("Score: 95 Begrunnelse: Stor lokal hendelse").await;
    h.pipeline = h.pipeline.with_feed(feed(SINGLE_SKIEN));

    h.pipeline.run_cycle_at(now()).await;
    let again = h.pipeline.run_cycle_at(now()).await;

    assert_eq!(again.new_items, 0);
    assert_eq!(again.sources[0].duplicates, 1);
    assert_eq!(h.scorer.calls(), 1, "second pass must not score again");
    assert_eq!(h.sink.alerts.lock().len(), 1, "no second notification");
    assert_eq!(h.store.query_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn each_gate_stops_its_own_items() {
    let mut h = harness("Score: 40 Begrunnelse: Lav interesse").await;
    h.pipeline = h.pipeline.with_feed(feed(MIXED_FEED));

    let report = h.pipeline.run_cycle_at(now()).await;
    let src = &report.sources[0];
    assert_eq!(src.source, "https://www.nrk.no/vestfoldogtelemark/siste.rss");
    assert_eq!(src.fetched, 4);
    assert_eq!(src.stale, 1);
    assert_eq!(src.excluded, 1);
    assert_eq!(src.unmatched, 1);
    assert_eq!(src.stored, 1);
    assert_eq!(h.scorer.calls(), 1);
    // 40 is below the alert threshold.
    assert_eq!(report.notified, 0);
    assert!(h.sink.alerts.lock().is_empty());
}

#[tokio::test]
async fn failing_source_does_not_stop_the_cycle() {
    let mut h = harness("Score: 75 Begrunnelse: Viktig").await;
    h.pipeline = h
        .pipeline
        .with_feed(Arc::new(FailingSource))
        .with_feed(feed(SINGLE_SKIEN));

    let report = h.pipeline.run_cycle_at(now()).await;
    assert_eq!(report.failed_sources, 1);
    assert_eq!(report.sources.len(), 2);
    assert!(report.sources[0].error.as_deref().unwrap().contains("unexpected EOF"));
    assert_eq!(report.new_items, 1);
    assert_eq!(h.sink.alerts.lock()[0].severity, Severity::Important);
}

#[tokio::test]
async fn store_failure_fails_only_that_item() {
    let repo = Arc::new(FlakyRepo {
        inner: SqliteArticleStore::in_memory().await.unwrap(),
        fail_insert: "/fail",
        fail_exists: "",
    });
    let mut h = harness_with(repo, "Score: 80 Begrunnelse: Viktig").await;
    h.pipeline = h.pipeline.with_feed(Arc::new(FixedSource(vec![
        CandidateItem::new("Ulykke i Skien", "https://x.no/fail/1", "X"),
        CandidateItem::new("Ny bro i Porsgrunn", "https://x.no/ok/2", "X"),
    ])));

    let report = h.pipeline.run_cycle_at(now()).await;
    assert_eq!(report.failed_items, 1);
    assert_eq!(report.new_items, 1);
    assert_eq!(h.sink.alerts.lock().len(), 1);
    let rows = h.store.query_all().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].link, "https://x.no/ok/2");
}

#[tokio::test]
async fn dedup_read_failure_counts_as_seen() {
    let repo = Arc::new(FlakyRepo {
        inner: SqliteArticleStore::in_memory().await.unwrap(),
        fail_insert: "",
        fail_exists: "/broken",
    });
    let mut h = harness_with(repo, "Score: 80 Begrunnelse: Viktig").await;
    h.pipeline = h.pipeline.with_feed(Arc::new(FixedSource(vec![CandidateItem::new(
        "Brann i Skien",
        "https://x.no/broken/1",
        "X",
    )])));

    let report = h.pipeline.run_cycle_at(now()).await;
    assert_eq!(report.new_items, 0);
    assert_eq!(report.sources[0].duplicates, 1);
    assert_eq!(h.scorer.calls(), 0);
}

#[tokio::test]
async fn bulletin_runs_before_feeds_and_phase_ends_done() {
    let cfg = BulletinConfig {
        categories: vec![BulletinCategory::BankruptcyOpening],
        ..Default::default()
    };
    let mut h = harness("Score: 72 Begrunnelse: Lokal konkurs").await;
    h.pipeline = h
        .pipeline
        .with_bulletin(Arc::new(BulletinProvider::from_fixture(cfg, BULLETIN_PAGE)))
        .with_feed(feed(SINGLE_SKIEN));
    let phase = h.pipeline.subscribe_phase();
    assert_eq!(*phase.borrow(), CyclePhase::Idle);

    let report = h.pipeline.run_cycle_at(now()).await;
    assert_eq!(report.sources[0].source, "Brønnøysundregistrene");
    assert_eq!(report.sources[0].fetched, 2);
    assert_eq!(report.sources[0].stored, 2);
    assert_eq!(report.new_items, 3);
    assert_eq!(*phase.borrow(), CyclePhase::Done);

    let rows = h.store.query_all().await.unwrap();
    assert!(rows
        .iter()
        .any(|a| a.title == "Konkursåpning: SKIEN BYGG OG ANLEGG AS" && a.published == "Ukjent"));
}

#[tokio::test]
async fn keyword_edits_apply_to_next_cycle_only() {
    let mut h = harness("Score: 60 Begrunnelse: Middels").await;
    h.pipeline = h
        .pipeline
        .with_keywords(KeywordSet::parse("Porsgrunn"))
        .with_feed(feed(SINGLE_SKIEN));

    assert_eq!(h.pipeline.run_cycle_at(now()).await.new_items, 0);
    h.pipeline.set_keywords(KeywordSet::parse("Skien"));
    assert_eq!(h.pipeline.run_cycle_at(now()).await.new_items, 1);
    assert_eq!(h.pipeline.keywords().to_delimited(), "Skien");
}

#[tokio::test]
async fn concurrent_cycles_score_a_link_once() {
    let mut h = harness("Score: 95 Begrunnelse: Stor lokal hendelse").await;
    h.pipeline = h.pipeline.with_feed(feed(SINGLE_SKIEN));

    let (a, b) = tokio::join!(h.pipeline.run_cycle_at(now()), h.pipeline.run_cycle_at(now()));
    assert_eq!(a.new_items + b.new_items, 1);
    assert_eq!(h.scorer.calls(), 1);
    assert_eq!(h.sink.alerts.lock().len(), 1);
}

#[tokio::test]
async fn concurrent_items_for_one_link_score_once() {
    let h = harness("Score: 95 Begrunnelse: Stor lokal hendelse").await;
    let matcher = KeywordMatcher::new(&h.pipeline.keywords());
    let item = CandidateItem::new("Brann i Skien sentrum", "https://www.nrk.no/telemark/brann-1", "NRK")
        .with_published((now() - chrono::Duration::hours(1)).to_rfc2822());

    let (a, b) = tokio::join!(
        h.pipeline.process_item(&item, &matcher, now()),
        h.pipeline.process_item(&item, &matcher, now()),
    );
    let mut outcomes = [a, b];
    outcomes.sort_by_key(|o| matches!(o, ItemOutcome::Stored { .. }));
    assert_eq!(outcomes, [ItemOutcome::Duplicate, ItemOutcome::Stored { notified: true }]);
    assert_eq!(h.scorer.calls(), 1);
    assert_eq!(h.store.query_all().await.unwrap().len(), 1);
    assert_eq!(h.sink.alerts.lock().len(), 1);
}

#[tokio::test]
async fn same_link_in_two_feeds_is_stored_once() {
    let mut h = harness("Score: 95 Begrunnelse: Stor lokal hendelse").await;
    h.pipeline = h.pipeline.with_feed(feed(SINGLE_SKIEN)).with_feed(feed(MIXED_FEED));

    let report = h.pipeline.run_cycle_at(now()).await;
    assert_eq!(report.new_items, 1);
    assert_eq!(report.sources[1].duplicates, 1);
    assert_eq!(h.scorer.calls(), 1);
}

#[tokio::test]
async fn without_credential_items_get_default_score_and_no_alert() {
    let store: Arc<dyn ArticleRepository> = Arc::new(SqliteArticleStore::in_memory().await.unwrap());
    let sink = Arc::new(RecordingSink::default());
    let pipeline = Pipeline::new(
        store.clone(),
        Arc::new(DisabledScorer),
        NotifierMux::new(AlertGate::default()).with_sink(sink.clone()),
    )
    .with_feed(feed(SINGLE_SKIEN));

    assert_eq!(pipeline.run_cycle_at(now()).await.new_items, 1);
    let rows = store.query_all().await.unwrap();
    assert_eq!(rows[0].ai_score, 50);
    assert_eq!(rows[0].ai_reason, UNCONFIGURED_REASON);
    assert!(sink.alerts.lock().is_empty());
}

#[tokio::test]
async fn test_article_is_stored_and_alerted() {
    let h = harness("Score: 1").await;
    let a = h.pipeline.store_test_article(now()).await.unwrap().expect("inserted");
    assert_eq!(a.ai_score, 95);
    assert_eq!(a.source, "TestKilde");
    assert!(h.store.exists(&a.link).await.unwrap());
    assert_eq!(h.sink.alerts.lock()[0].severity, Severity::Breaking);
    assert_eq!(h.scorer.calls(), 0);
}

#[tokio::test]
async fn repeated_test_article_in_same_second_is_not_realerted() {
    let h = harness("Score: 1").await;
    assert!(h.pipeline.store_test_article(now()).await.unwrap().is_some());
    assert!(h.pipeline.store_test_article(now()).await.unwrap().is_none());
    assert_eq!(h.store.query_all().await.unwrap().len(), 1);
    assert_eq!(h.sink.alerts.lock().len(), 1);
}

struct PendingSource;

#[async_trait]
impl SourceProvider for PendingSource {
    async fn fetch_latest(&self) -> Result<Vec<CandidateItem>, SourceError> {
        std::future::pending().await
    }

    fn name(&self) -> &str {
        "hung"
    }
}

#[tokio::test]
async fn dropped_cycle_resets_phase_to_idle() {
    let mut h = harness("Score: 95").await;
    h.pipeline = h.pipeline.with_feed(Arc::new(PendingSource));
    let mut phases = h.pipeline.subscribe_phase();

    let cut = tokio::time::timeout(Duration::from_millis(50), h.pipeline.run_cycle_at(now())).await;
    assert!(cut.is_err());
    assert!(phases.has_changed().unwrap());
    assert_eq!(*phases.borrow_and_update(), CyclePhase::Idle);
    assert_eq!(h.pipeline.phase(), CyclePhase::Idle);
}
