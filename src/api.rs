use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::error::StoreError;
use crate::filter::KeywordSet;
use crate::pipeline::{CycleReport, CyclePhase, Pipeline};
use crate::store::{ArticleStats, StoredArticle};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/articles", get(list_articles))
        .route("/stats", get(stats))
        .route("/keywords", get(get_keywords).put(put_keywords))
        .route("/cycle", post(trigger_cycle))
        .route("/admin/reset", post(admin_reset))
        .route("/admin/test-article", post(admin_test_article))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::warn!(target: "store", error = %self.0, "request failed");
        let body = serde_json::json!({ "error": self.0.to_string() });
        (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
    }
}

#[derive(Deserialize, Default)]
struct ArticlesQuery {
    #[serde(default)]
    min_score: Option<i64>,
    #[serde(default)]
    limit: Option<usize>,
}

async fn list_articles(
    State(state): State<AppState>,
    Query(q): Query<ArticlesQuery>,
) -> Result<Json<Vec<StoredArticle>>, ApiError> {
    let mut rows = state.pipeline.store().query_all().await?;
    if let Some(min) = q.min_score {
        rows.retain(|a| a.ai_score >= min);
    }
    if let Some(limit) = q.limit {
        rows.truncate(limit);
    }
    Ok(Json(rows))
}

#[derive(Serialize)]
struct StatsOut {
    #[serde(flatten)]
    articles: ArticleStats,
    day: String,
    phase: CyclePhase,
    notify_sinks: usize,
}

async fn stats(State(state): State<AppState>) -> Result<Json<StatsOut>, ApiError> {
    let p = &state.pipeline;
    let day = Utc::now()
        .with_timezone(&p.display_offset())
        .format("%Y-%m-%d")
        .to_string();
    let articles = p.store().stats(&day).await?;
    Ok(Json(StatsOut {
        articles,
        day,
        phase: p.phase(),
        notify_sinks: p.notifier().sink_count(),
    }))
}

#[derive(Serialize, Deserialize)]
struct KeywordsBody {
    /// Comma-delimited.
    keywords: String,
}

async fn get_keywords(State(state): State<AppState>) -> Json<KeywordsBody> {
    Json(KeywordsBody {
        keywords: state.pipeline.keywords().to_delimited(),
    })
}

async fn put_keywords(
    State(state): State<AppState>,
    Json(body): Json<KeywordsBody>,
) -> Result<Json<KeywordsBody>, StatusCode> {
    let set = KeywordSet::parse(&body.keywords);
    if set.is_empty() {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    state.pipeline.set_keywords(set);
    tracing::info!(target: "pipeline", keywords = %body.keywords, "keywords updated");
    Ok(Json(KeywordsBody {
        keywords: state.pipeline.keywords().to_delimited(),
    }))
}

async fn trigger_cycle(State(state): State<AppState>) -> Json<CycleReport> {
    Json(state.pipeline.run_cycle().await)
}

async fn admin_reset(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.pipeline.store().reset().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn admin_test_article(State(state): State<AppState>) -> Result<Response, ApiError> {
    let resp = match state.pipeline.store_test_article(Utc::now()).await? {
        Some(article) => (StatusCode::CREATED, Json(article)).into_response(),
        None => {
            let body = serde_json::json!({ "error": "test article for this second already stored" });
            (StatusCode::CONFLICT, Json(body)).into_response()
        }
    };
    Ok(resp)
}
