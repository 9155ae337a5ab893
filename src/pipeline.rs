// src/pipeline.rs
//! One ingestion cycle: bulletin board first, then every feed in order.
//!
//! Per candidate the chain is
//! freshness → self-exclusion → keyword → dedup → score → persist → notify,
//! stopping at the first stage that rejects. A failing source is logged and
//! skipped; a failing item is counted and skipped. Nothing here aborts a cycle.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use metrics::counter;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::{watch, Mutex, OwnedMutexGuard};

use crate::config::AppConfig;
use crate::filter::{Freshness, KeywordMatcher, KeywordSet, SelfExclusion};
use crate::ingest::providers::{bulletin::BulletinProvider, rss::RssFeedProvider};
use crate::ingest::types::{CandidateItem, SourceProvider};
use crate::ingest::{clean_html, truncate_chars};
use crate::notify::{NotifierMux, NotifyOutcome};
use crate::scoring::{build_scorer, DynScorer, ScoreVerdict};
use crate::store::{
    ArticleRepository, InsertOutcome, StoredArticle, DEFAULT_STATUS, DISCOVERED_AT_FORMAT,
    UNKNOWN_PUBLISHED,
};

pub const SUMMARY_MAX_CHARS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "feed", rename_all = "snake_case")]
pub enum CyclePhase {
    Idle,
    FetchingBulletin,
    /// Index into the configured feed list.
    FetchingFeeds(usize),
    Done,
}

/// Terminal state of one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Stale,
    Excluded,
    NoKeyword,
    /// Already stored (or the dedup read failed, which counts as seen).
    Duplicate,
    Stored { notified: bool },
    /// Persisting failed; the item is not counted as new.
    Failed,
}

impl ItemOutcome {
    fn stage(self) -> &'static str {
        match self {
            ItemOutcome::Stale => "freshness",
            ItemOutcome::Excluded => "exclusion",
            ItemOutcome::NoKeyword => "keyword",
            ItemOutcome::Duplicate => "dedup",
            ItemOutcome::Stored { .. } => "stored",
            ItemOutcome::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub fetched: usize,
    pub stale: usize,
    pub excluded: usize,
    pub unmatched: usize,
    pub duplicates: usize,
    pub stored: usize,
    pub notified: usize,
    pub failed_items: usize,
    /// Set when the fetch itself failed.
    pub error: Option<String>,
}

impl SourceReport {
    fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            ..Default::default()
        }
    }

    fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Stale => self.stale += 1,
            ItemOutcome::Excluded => self.excluded += 1,
            ItemOutcome::NoKeyword => self.unmatched += 1,
            ItemOutcome::Duplicate => self.duplicates += 1,
            ItemOutcome::Stored { notified } => {
                self.stored += 1;
                if notified {
                    self.notified += 1;
                }
            }
            ItemOutcome::Failed => self.failed_items += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub new_items: usize,
    pub notified: usize,
    pub failed_sources: usize,
    pub failed_items: usize,
    pub sources: Vec<SourceReport>,
}

impl CycleReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            new_items: 0,
            notified: 0,
            failed_sources: 0,
            failed_items: 0,
            sources: Vec::new(),
        }
    }

    fn push(&mut self, src: SourceReport) {
        self.new_items += src.stored;
        self.notified += src.notified;
        self.failed_items += src.failed_items;
        if src.error.is_some() {
            self.failed_sources += 1;
        }
        self.sources.push(src);
    }
}

/// Per-link async critical sections. Entries are removed once the last
/// holder releases.
#[derive(Default)]
pub struct LinkLocks {
    inner: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

pub struct LinkGuard<'a> {
    locks: &'a LinkLocks,
    link: String,
    handle: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl LinkLocks {
    pub async fn acquire(&self, link: &str) -> LinkGuard<'_> {
        let handle = {
            let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            map.entry(link.to_string()).or_default().clone()
        };
        let guard = handle.clone().lock_owned().await;
        LinkGuard {
            locks: self,
            link: link.to_string(),
            handle,
            guard: Some(guard),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for LinkGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut map = self.locks.inner.lock().unwrap_or_else(|p| p.into_inner());
        // map + our handle
        if Arc::strong_count(&self.handle) == 2 {
            map.remove(&self.link);
        }
    }
}

/// Puts the phase back to `Idle` when a cycle future is dropped mid-run.
struct PhaseReset<'a> {
    phase: &'a watch::Sender<CyclePhase>,
    finished: bool,
}

impl Drop for PhaseReset<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let last = *self.phase.borrow();
            tracing::warn!(target: "pipeline", phase = ?last, "cycle dropped before completion");
            self.phase.send_replace(CyclePhase::Idle);
        }
    }
}

struct KeywordState {
    set: KeywordSet,
    matcher: Arc<KeywordMatcher>,
}

impl KeywordState {
    fn new(set: KeywordSet) -> Self {
        let matcher = Arc::new(KeywordMatcher::new(&set));
        Self { set, matcher }
    }
}

pub struct Pipeline {
    bulletin: Option<Arc<dyn SourceProvider>>,
    feeds: Vec<Arc<dyn SourceProvider>>,
    freshness: Freshness,
    exclusion: SelfExclusion,
    keywords: RwLock<KeywordState>,
    store: Arc<dyn ArticleRepository>,
    scorer: DynScorer,
    notifier: NotifierMux,
    display_offset: FixedOffset,
    anon_logs: bool,
    cycle_lock: Mutex<()>,
    link_locks: LinkLocks,
    phase: watch::Sender<CyclePhase>,
}

impl Pipeline {
    pub fn new(store: Arc<dyn ArticleRepository>, scorer: DynScorer, notifier: NotifierMux) -> Self {
        let (phase, _) = watch::channel(CyclePhase::Idle);
        Self {
            bulletin: None,
            feeds: Vec::new(),
            freshness: Freshness::default(),
            exclusion: SelfExclusion::default(),
            keywords: RwLock::new(KeywordState::new(KeywordSet::default())),
            store,
            scorer,
            notifier,
            display_offset: Utc.fix(),
            anon_logs: false,
            cycle_lock: Mutex::new(()),
            link_locks: LinkLocks::default(),
            phase,
        }
    }

    pub fn with_bulletin(mut self, provider: Arc<dyn SourceProvider>) -> Self {
        self.bulletin = Some(provider);
        self
    }

    pub fn with_feed(mut self, provider: Arc<dyn SourceProvider>) -> Self {
        self.feeds.push(provider);
        self
    }

    pub fn with_freshness(mut self, freshness: Freshness) -> Self {
        self.freshness = freshness;
        self
    }

    pub fn with_exclusion(mut self, exclusion: SelfExclusion) -> Self {
        self.exclusion = exclusion;
        self
    }

    pub fn with_keywords(self, keywords: KeywordSet) -> Self {
        self.set_keywords(keywords);
        self
    }

    /// Hours east of UTC used for `discovered_at`. Out-of-range values fall back to UTC.
    pub fn with_display_offset_hours(mut self, hours: i32) -> Self {
        self.display_offset = hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix());
        self
    }

    /// Log a short hash instead of raw links.
    pub fn with_anonymized_logs(mut self, on: bool) -> Self {
        self.anon_logs = on;
        self
    }

    /// Takes effect from the next candidate examined; stored rows are untouched.
    pub fn set_keywords(&self, keywords: KeywordSet) {
        let mut guard = self.keywords.write().unwrap_or_else(|p| p.into_inner());
        *guard = KeywordState::new(keywords);
    }

    pub fn keywords(&self) -> KeywordSet {
        self.keywords
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .set
            .clone()
    }

    pub fn store(&self) -> &Arc<dyn ArticleRepository> {
        &self.store
    }

    pub fn notifier(&self) -> &NotifierMux {
        &self.notifier
    }

    pub fn display_offset(&self) -> FixedOffset {
        self.display_offset
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<CyclePhase> {
        self.phase.subscribe()
    }

    pub fn phase(&self) -> CyclePhase {
        *self.phase.borrow()
    }

    pub async fn run_cycle(&self) -> CycleReport {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run one cycle with `now` as the freshness reference. Concurrent
    /// callers queue on the cycle lock.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> CycleReport {
        let _cycle = self.cycle_lock.lock().await;
        let mut phase = PhaseReset {
            phase: &self.phase,
            finished: false,
        };
        let matcher = self.current_matcher();
        let mut report = CycleReport::new(now);

        if let Some(bulletin) = &self.bulletin {
            self.phase.send_replace(CyclePhase::FetchingBulletin);
            report.push(self.run_source(bulletin.as_ref(), &matcher, now).await);
        }
        for (i, feed) in self.feeds.iter().enumerate() {
            self.phase.send_replace(CyclePhase::FetchingFeeds(i));
            report.push(self.run_source(feed.as_ref(), &matcher, now).await);
        }
        self.phase.send_replace(CyclePhase::Done);
        phase.finished = true;

        counter!("pipeline_cycles_total").increment(1);
        counter!("pipeline_new_items_total").increment(report.new_items as u64);
        tracing::info!(
            target: "pipeline",
            new_items = report.new_items,
            notified = report.notified,
            failed_sources = report.failed_sources,
            failed_items = report.failed_items,
            "cycle finished"
        );
        report
    }

    fn current_matcher(&self) -> Arc<KeywordMatcher> {
        self.keywords
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .matcher
            .clone()
    }

    async fn run_source(
        &self,
        source: &dyn SourceProvider,
        matcher: &KeywordMatcher,
        now: DateTime<Utc>,
    ) -> SourceReport {
        let mut rep = SourceReport::new(source.name());
        let items = match source.fetch_latest().await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(target: "pipeline", source = source.name(), error = %e, "source skipped");
                counter!("pipeline_source_errors_total").increment(1);
                rep.error = Some(e.to_string());
                return rep;
            }
        };
        rep.fetched = items.len();

        for item in &items {
            let outcome = self.process_item(item, matcher, now).await;
            if !matches!(outcome, ItemOutcome::Stored { .. }) {
                counter!("pipeline_filtered_total", "stage" => outcome.stage()).increment(1);
            }
            rep.record(outcome);
        }
        tracing::debug!(
            target: "pipeline",
            source = %rep.source,
            fetched = rep.fetched,
            stored = rep.stored,
            duplicates = rep.duplicates,
            "source done"
        );
        rep
    }

    pub async fn process_item(
        &self,
        item: &CandidateItem,
        matcher: &KeywordMatcher,
        now: DateTime<Utc>,
    ) -> ItemOutcome {
        if !self.freshness.accepts(item, now) {
            return ItemOutcome::Stale;
        }
        if self.exclusion.excludes(item) {
            return ItemOutcome::Excluded;
        }
        let Some(keyword) = matcher.match_item(item).map(str::to_owned) else {
            return ItemOutcome::NoKeyword;
        };

        let link_id = self.log_link(&item.link);
        let article = {
            let _link = self.link_locks.acquire(&item.link).await;

            match self.store.exists(&item.link).await {
                Ok(false) => {}
                Ok(true) => return ItemOutcome::Duplicate,
                Err(e) => {
                    tracing::warn!(target: "pipeline", link = %link_id, error = %e, "dedup read failed; treating as seen");
                    return ItemOutcome::Duplicate;
                }
            }

            let title = clean_html(&item.title);
            let body = clean_html(&item.body);
            let verdict = self.scorer.score(&title, &body, &keyword).await;
            let article = build_article(item, &keyword, &verdict, now, self.display_offset);

            match self.store.insert(&article).await {
                Ok(InsertOutcome::Inserted) => article,
                Ok(InsertOutcome::Duplicate) => return ItemOutcome::Duplicate,
                Err(e) => {
                    tracing::warn!(target: "pipeline", link = %link_id, error = %e, "insert failed");
                    return ItemOutcome::Failed;
                }
            }
        };

        tracing::info!(
            target: "pipeline",
            link = %link_id,
            keyword = %keyword,
            score = article.ai_score,
            "stored"
        );
        let notified = matches!(
            self.notifier.notify(&article).await,
            NotifyOutcome::Dispatched { .. }
        );
        ItemOutcome::Stored { notified }
    }

    /// Store a fixed high-score article and push it through the notifier.
    /// `None` when the link for `now` is already stored; nothing is sent then.
    pub async fn store_test_article(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<StoredArticle>, crate::error::StoreError> {
        let article = StoredArticle {
            link: format!("http://test{}.no", now.timestamp()),
            title: "Test-sak fra Skien".to_string(),
            summary: "Dette er en test.".to_string(),
            source: "TestKilde".to_string(),
            published: "Nå".to_string(),
            discovered_at: format_discovered(now, self.display_offset),
            matched_keyword: "Skien".to_string(),
            ai_score: 95,
            ai_reason: "Test av høy score".to_string(),
            status: DEFAULT_STATUS.to_string(),
        };
        match self.store.insert(&article).await? {
            InsertOutcome::Inserted => {
                self.notifier.notify(&article).await;
                Ok(Some(article))
            }
            InsertOutcome::Duplicate => Ok(None),
        }
    }

    fn log_link(&self, link: &str) -> String {
        if self.anon_logs {
            anon_link(link)
        } else {
            link.to_string()
        }
    }
}

impl Pipeline {
    /// Wire sources, filters, scorer and notifier from `cfg` around `store`.
    pub fn from_config(cfg: &AppConfig, store: Arc<dyn ArticleRepository>) -> Self {
        let timeout = Duration::from_secs(cfg.sources.fetch_timeout_secs.max(1));
        let scorer = build_scorer(&cfg.scoring);
        let notifier = NotifierMux::from_config(&cfg.notify);

        let mut pipeline = Pipeline::new(store, scorer, notifier)
            .with_freshness(Freshness::new(cfg.filter.freshness_hours))
            .with_exclusion(SelfExclusion::new(&cfg.filter.self_identifiers))
            .with_keywords(cfg.filter.keyword_set())
            .with_display_offset_hours(cfg.store.display_utc_offset_hours);

        if cfg.sources.bulletin.enabled {
            pipeline = pipeline.with_bulletin(Arc::new(BulletinProvider::new(
                cfg.sources.bulletin.clone(),
                timeout,
            )));
        }
        for url in &cfg.sources.feeds {
            pipeline = pipeline.with_feed(Arc::new(RssFeedProvider::from_url(url.clone(), timeout)));
        }
        pipeline
    }
}

pub fn format_discovered(at: DateTime<Utc>, offset: FixedOffset) -> String {
    at.with_timezone(&offset).format(DISCOVERED_AT_FORMAT).to_string()
}

/// Map an accepted candidate and its verdict to the persisted row.
pub fn build_article(
    item: &CandidateItem,
    keyword: &str,
    verdict: &ScoreVerdict,
    discovered: DateTime<Utc>,
    offset: FixedOffset,
) -> StoredArticle {
    StoredArticle {
        link: item.link.clone(),
        title: clean_html(&item.title),
        summary: truncate_chars(&clean_html(&item.body), SUMMARY_MAX_CHARS),
        source: item.source_label.clone(),
        published: item
            .published_raw
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_PUBLISHED.to_string()),
        discovered_at: format_discovered(discovered, offset),
        matched_keyword: keyword.to_string(),
        ai_score: i64::from(verdict.score.min(100)),
        ai_reason: verdict.justification.clone(),
        status: DEFAULT_STATUS.to_string(),
    }
}

/// First 12 hex chars of the link's SHA-256.
pub fn anon_link(link: &str) -> String {
    let digest = Sha256::digest(link.as_bytes());
    digest.iter().take(6).map(|b| format!("{b:02x}")).collect()
}
