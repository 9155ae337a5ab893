// src/store.rs
//! Article repository. The `articles` table doubles as the dedup index: a
//! link present here is "seen".

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use tracing::{debug, info};

use crate::error::StoreError;

pub const DEFAULT_STATUS: &str = "new";
pub const UNKNOWN_PUBLISHED: &str = "Ukjent";
pub const DISCOVERED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct StoredArticle {
    pub link: String,
    pub title: String,
    pub summary: String,
    pub source: String,
    pub published: String,
    /// `DISCOVERED_AT_FORMAT` in display time; sorts lexicographically.
    pub discovered_at: String,
    pub matched_keyword: String,
    pub ai_score: i64,
    pub ai_reason: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The link was already stored; nothing was written.
    Duplicate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArticleStats {
    pub total: i64,
    pub today: i64,
    pub average_score: Option<f64>,
}

#[async_trait]
pub trait ArticleRepository: Send + Sync {
    async fn exists(&self, link: &str) -> Result<bool, StoreError>;
    async fn insert(&self, article: &StoredArticle) -> Result<InsertOutcome, StoreError>;
    /// All articles, newest discovery first.
    async fn query_all(&self) -> Result<Vec<StoredArticle>, StoreError>;
    /// `day` is a `YYYY-MM-DD` prefix of `discovered_at`.
    async fn stats(&self, day: &str) -> Result<ArticleStats, StoreError>;
    /// Drop and recreate the store. Destructive.
    async fn reset(&self) -> Result<(), StoreError>;
}

const CREATE_ARTICLES: &str = r#"
CREATE TABLE IF NOT EXISTS articles (
    link            TEXT PRIMARY KEY NOT NULL,
    title           TEXT NOT NULL,
    summary         TEXT NOT NULL DEFAULT '',
    source          TEXT NOT NULL,
    published       TEXT NOT NULL,
    discovered_at   TEXT NOT NULL,
    matched_keyword TEXT NOT NULL,
    ai_score        INTEGER NOT NULL CHECK (ai_score BETWEEN 0 AND 100),
    ai_reason       TEXT NOT NULL,
    status          TEXT NOT NULL DEFAULT 'new'
)"#;

const CREATE_DISCOVERED_IDX: &str =
    "CREATE INDEX IF NOT EXISTS idx_articles_discovered ON articles (discovered_at DESC)";

#[derive(Clone)]
pub struct SqliteArticleStore {
    pool: SqlitePool,
}

impl SqliteArticleStore {
    /// Open (creating if missing) the SQLite file at `path` and ensure the schema.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let init_err = |source| StoreError::Init {
            path: path.to_string(),
            source,
        };
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .map_err(init_err)?;
        let store = Self { pool };
        store.migrate().await.map_err(init_err)?;
        info!(target: "store", %path, "article store ready");
        Ok(store)
    }

    /// Private in-memory store; one connection so every query sees the same DB.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let init_err = |source| StoreError::Init {
            path: ":memory:".to_string(),
            source,
        };
        let opts = SqliteConnectOptions::from_str("sqlite::memory:").map_err(init_err)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await
            .map_err(init_err)?;
        let store = Self { pool };
        store.migrate().await.map_err(init_err)?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(CREATE_ARTICLES).execute(&self.pool).await?;
        sqlx::query(CREATE_DISCOVERED_IDX).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ArticleRepository for SqliteArticleStore {
    async fn exists(&self, link: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM articles WHERE link = ?1")
            .bind(link)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn insert(&self, a: &StoredArticle) -> Result<InsertOutcome, StoreError> {
        let res = sqlx::query(
            r#"
            INSERT INTO articles
                (link, title, summary, source, published, discovered_at,
                 matched_keyword, ai_score, ai_reason, status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(link) DO NOTHING
            "#,
        )
        .bind(&a.link)
        .bind(&a.title)
        .bind(&a.summary)
        .bind(&a.source)
        .bind(&a.published)
        .bind(&a.discovered_at)
        .bind(&a.matched_keyword)
        .bind(a.ai_score.clamp(0, 100))
        .bind(&a.ai_reason)
        .bind(&a.status)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            debug!(target: "store", link = %a.link, "duplicate link ignored");
            Ok(InsertOutcome::Duplicate)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }

    async fn query_all(&self) -> Result<Vec<StoredArticle>, StoreError> {
        let rows = sqlx::query_as::<_, StoredArticle>(
            r#"
            SELECT link, title, summary, source, published, discovered_at,
                   matched_keyword, ai_score, ai_reason, status
            FROM articles
            ORDER BY discovered_at DESC, rowid DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn stats(&self, day: &str) -> Result<ArticleStats, StoreError> {
        let (total, today, average_score): (i64, i64, Option<f64>) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(CASE WHEN discovered_at LIKE ?1 || '%' THEN 1 ELSE 0 END), 0),
                   AVG(ai_score)
            FROM articles
            "#,
        )
        .bind(day)
        .fetch_one(&self.pool)
        .await?;
        Ok(ArticleStats {
            total,
            today,
            average_score,
        })
    }

    async fn reset(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DROP TABLE IF EXISTS articles")
            .execute(&mut *tx)
            .await?;
        sqlx::query(CREATE_ARTICLES).execute(&mut *tx).await?;
        sqlx::query(CREATE_DISCOVERED_IDX).execute(&mut *tx).await?;
        tx.commit().await?;
        info!(target: "store", "article store reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(link: &str, at: &str, score: i64) -> StoredArticle {
        StoredArticle {
            link: link.into(),
            title: "Brann i Skien".into(),
            summary: String::new(),
            source: "NRK".into(),
            published: UNKNOWN_PUBLISHED.into(),
            discovered_at: at.into(),
            matched_keyword: "Skien".into(),
            ai_score: score,
            ai_reason: "Lokal".into(),
            status: DEFAULT_STATUS.into(),
        }
    }

    #[tokio::test]
    async fn second_insert_is_duplicate_not_overwrite() {
        let store = SqliteArticleStore::in_memory().await.unwrap();
        let a = article("https://x/1", "2026-10-17 10:00:00", 80);
        assert_eq!(store.insert(&a).await.unwrap(), InsertOutcome::Inserted);

        let mut b = a.clone();
        b.ai_score = 10;
        assert_eq!(store.insert(&b).await.unwrap(), InsertOutcome::Duplicate);

        let all = store.query_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].ai_score, 80);
        assert!(store.exists("https://x/1").await.unwrap());
        assert!(!store.exists("https://x/2").await.unwrap());
    }

    #[tokio::test]
    async fn stats_count_today_and_average() {
        let store = SqliteArticleStore::in_memory().await.unwrap();
        store.insert(&article("a", "2026-10-16 23:59:00", 40)).await.unwrap();
        store.insert(&article("b", "2026-10-17 08:00:00", 80)).await.unwrap();
        let s = store.stats("2026-10-17").await.unwrap();
        assert_eq!(s.total, 2);
        assert_eq!(s.today, 1);
        assert_eq!(s.average_score, Some(60.0));
    }

    #[tokio::test]
    async fn stats_on_empty_store() {
        let store = SqliteArticleStore::in_memory().await.unwrap();
        let s = store.stats("2026-10-17").await.unwrap();
        assert_eq!(s, ArticleStats::default());
    }
}
