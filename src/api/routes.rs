//! API route definitions.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::state::AppState;
use crate::config::{Settings, TestInterval};
use crate::history::DateRange;
use crate::scheduler::TestOutcome;

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/history", get(history).delete(clear_history))
        .route("/statistics", get(statistics))
        .route("/settings", get(get_settings).put(put_settings))
        .route("/tests/run", post(run_test))
        .route("/tests/start", post(start_testing))
        .route("/tests/stop", post(stop_testing))
        .route("/tests/toggle", post(toggle_testing))
}

fn meta() -> Value {
    json!({
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })
}

fn reject(status: StatusCode, message: impl std::fmt::Display) -> (StatusCode, Json<Value>) {
    (
        status,
        Json(json!({ "error": { "message": message.to_string() }, "meta": meta() })),
    )
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": { "status": "ok", "version": env!("CARGO_PKG_VERSION") },
        "meta": meta()
    }))
}

async fn status(State(state): State<AppState>) -> Json<Value> {
    let orch = &state.orchestrator;
    let current = orch.current_state().await;
    let settings = orch.settings().await;
    let running = orch.is_running().await;
    Json(json!({
        "data": {
            "current": current,
            "running": running,
            "testing": orch.is_testing(),
            "intervalSeconds": settings.interval.as_secs()
        },
        "meta": meta()
    }))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    range: Option<String>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

impl HistoryQuery {
    fn date_range(&self) -> Result<DateRange, (StatusCode, Json<Value>)> {
        match (self.from, self.to) {
            (Some(from), Some(to)) => Ok(DateRange::Between { from, to }),
            (None, None) => self
                .range
                .as_deref()
                .map_or(Ok(DateRange::All), |r| r.parse::<DateRange>())
                .map_err(|e| reject(StatusCode::BAD_REQUEST, e)),
            _ => Err(reject(
                StatusCode::BAD_REQUEST,
                "'from' and 'to' must be given together",
            )),
        }
    }
}

async fn history(State(state): State<AppState>, Query(q): Query<HistoryQuery>) -> ApiResult {
    let range = q.date_range()?;
    let readings = state.orchestrator.history_in_range(&range).await;
    Ok(Json(json!({
        "data": readings,
        "meta": { "total": readings.len(), "range": range, "timestamp": Utc::now().to_rfc3339() }
    })))
}

async fn clear_history(State(state): State<AppState>) -> Json<Value> {
    state.orchestrator.clear_history().await;
    Json(json!({ "data": { "cleared": true }, "meta": meta() }))
}

async fn statistics(State(state): State<AppState>) -> Json<Value> {
    let stats = state.orchestrator.statistics().await;
    Json(json!({ "data": stats, "meta": meta() }))
}

async fn get_settings(State(state): State<AppState>) -> Json<Value> {
    let settings = state.orchestrator.settings().await;
    Json(json!({ "data": settings, "meta": meta() }))
}

/// Partial settings update; omitted fields keep their current value.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    interval_seconds: Option<u64>,
    max_history_size: Option<usize>,
    auto_cleanup: Option<bool>,
}

impl SettingsPatch {
    fn apply(self, mut settings: Settings) -> Result<Settings, (StatusCode, Json<Value>)> {
        if let Some(secs) = self.interval_seconds {
            settings.interval = TestInterval::try_from(secs)
                .map_err(|e| reject(StatusCode::UNPROCESSABLE_ENTITY, e))?;
        }
        if let Some(max) = self.max_history_size {
            settings.max_history_size = max;
        }
        if let Some(auto) = self.auto_cleanup {
            settings.auto_cleanup = auto;
        }
        Ok(settings)
    }
}

async fn put_settings(State(state): State<AppState>, Json(patch): Json<SettingsPatch>) -> ApiResult {
    let orch = &state.orchestrator;
    let settings = patch.apply(orch.settings().await)?;
    orch.update_settings(settings.clone())
        .await
        .map_err(|e| reject(StatusCode::UNPROCESSABLE_ENTITY, e))?;
    Ok(Json(json!({ "data": settings, "meta": meta() })))
}

async fn run_test(State(state): State<AppState>) -> ApiResult {
    match state.orchestrator.run_single_test().await {
        TestOutcome::Completed(reading) => Ok(Json(json!({
            "data": { "status": "completed", "reading": reading },
            "meta": meta()
        }))),
        TestOutcome::Failed(message) => Ok(Json(json!({
            "data": { "status": "error", "message": message },
            "meta": meta()
        }))),
        TestOutcome::AlreadyRunning => Err(reject(
            StatusCode::CONFLICT,
            "a speed test is already running",
        )),
    }
}

fn running_response(running: bool, changed: bool) -> Json<Value> {
    Json(json!({ "data": { "running": running, "changed": changed }, "meta": meta() }))
}

async fn start_testing(State(state): State<AppState>) -> Json<Value> {
    let changed = state.orchestrator.start_testing().await;
    running_response(true, changed)
}

async fn stop_testing(State(state): State<AppState>) -> Json<Value> {
    let changed = state.orchestrator.stop_testing().await;
    running_response(false, changed)
}

async fn toggle_testing(State(state): State<AppState>) -> Json<Value> {
    let running = state.orchestrator.toggle_testing().await;
    running_response(running, true)
}
