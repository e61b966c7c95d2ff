use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, Request, State,
    },
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method, StatusCode,
    },
    middleware,
    routing::{get, put},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, info_span};
use uuid::Uuid;

use crate::aggregator::{parse_date, parse_optional_date};
use crate::auth::require_admin;
use crate::config::Config;
use crate::error::AppError;
use crate::models::{
    AnalyticsQuery, ApiResponse, EpisodeQuery, HistoryQuery, WatchDateInput, WatchEntryInput,
};
use crate::projections::{AnalyticsProjector, AnalyticsReport, ProgressReport};
use crate::store::{EpisodeFilter, Store};

/// Shared handler state.
/// Analytics and progress are derived from the store on every request.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub config: Arc<Config>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]);

    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request| {
        info_span!(
            "request",
            id = %Uuid::new_v4(),
            method = %request.method(),
            uri = %request.uri(),
        )
    });

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/episodes", get(list_episodes))
        .route("/watch-history", get(list_watch_history).post(create_watch_entry))
        .route("/watch-history/:id", put(update_watch_entry).delete(delete_watch_entry))
        .route("/progress", get(get_progress))
        .route("/analytics", get(get_analytics))
        .layer(middleware::from_fn_with_state(state.clone(), require_admin))
        .layer(ServiceBuilder::new().layer(trace).layer(cors))
        .with_state(state)
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Runs store work on the blocking pool; SQLite calls never run on the reactor
async fn with_store<T, F>(state: &AppState, work: F) -> Result<T, AppError>
where
    F: FnOnce(&Store) -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(&state.store);
    tokio::task::spawn_blocking(move || work(store.as_ref())).await?
}

fn required_date(raw: Option<&str>) -> Option<&str> {
    raw.filter(|d| !d.trim().is_empty())
}

async fn root() -> &'static str {
    "Episode Tracker API v0.1.0"
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Episode catalog, optionally narrowed by id or text search
async fn list_episodes(
    State(state): State<AppState>,
    query: Result<Query<EpisodeQuery>, QueryRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Query(query) = query?;
    let filter = EpisodeFilter {
        episode_id: query.episode_id,
        search: query.search,
        limit: query.limit,
    };
    let episodes = with_store(&state, move |store| Ok(store.list_episodes(&filter)?)).await?;

    Ok(Json(serde_json::json!({ "episodes": episodes })))
}

async fn list_watch_history(
    State(state): State<AppState>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Query(query) = query?;
    let entries = with_store(&state, move |store| Ok(store.list_watch_history(query.limit)?)).await?;

    Ok(Json(serde_json::json!({ "watchHistory": entries })))
}

/// Log an episode as watched
async fn create_watch_entry(
    State(state): State<AppState>,
    payload: Result<Json<WatchEntryInput>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let Json(input) = payload?;
    let raw_date = required_date(input.watched_date.as_deref());
    let (Some(episode_id), Some(raw_date)) = (input.episode_id, raw_date) else {
        return Err(AppError::BadRequest(
            "episode_id and watched_date are required".to_string(),
        ));
    };

    let watched_date = parse_date(raw_date)?;
    let entry = with_store(&state, move |store| {
        Ok(store.create_watch_entry(episode_id, watched_date)?)
    })
    .await?;
    info!(id = entry.id, episode_id, %watched_date, "Episode logged");

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "watchEntry": entry })),
    ))
}

async fn update_watch_entry(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<WatchDateInput>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Path(id) = id?;
    let Json(input) = payload?;
    let Some(raw_date) = required_date(input.watched_date.as_deref()) else {
        return Err(AppError::BadRequest("watched_date is required".to_string()));
    };

    let watched_date = parse_date(raw_date)?;
    let entry = with_store(&state, move |store| Ok(store.update_watch_date(id, watched_date)?)).await?;
    info!(id, %watched_date, "Watch date updated");

    Ok(Json(serde_json::json!({ "watchEntry": entry })))
}

async fn delete_watch_entry(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<ApiResponse>, AppError> {
    let Path(id) = id?;
    with_store(&state, move |store| Ok(store.delete_watch_entry(id)?)).await?;
    info!(id, "Watch entry deleted");

    Ok(Json(ApiResponse {
        message: "Watch entry deleted successfully".to_string(),
    }))
}

async fn get_progress(State(state): State<AppState>) -> Result<Json<ProgressReport>, AppError> {
    let date = today();
    let progress = with_store(&state, move |store| Ok(ProgressReport::project(store, date)?)).await?;
    Ok(Json(progress))
}

/// Gap-filled chart data; dates pass through to the aggregator as given
async fn get_analytics(
    State(state): State<AppState>,
    query: Result<Query<AnalyticsQuery>, QueryRejection>,
) -> Result<Json<AnalyticsReport>, AppError> {
    let Query(query) = query?;
    let start = parse_optional_date(query.start_date.as_deref())?;
    let end = parse_optional_date(query.end_date.as_deref())?;

    let (week_start, max_days) = (state.config.week_start, state.config.max_chart_days);
    let date = today();
    let report = with_store(&state, move |store| {
        Ok(AnalyticsProjector::new(store, week_start, max_days).analyze(start, end, date)?)
    })
    .await?;

    Ok(Json(report))
}
