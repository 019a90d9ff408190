use std::collections::BTreeMap;
use std::sync::Arc;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use shared::protocol::API_PREFIX;
use shared::types::{PageView, ReconciliationEntry};
use crate::store_manager::SnapshotReader;

#[derive(Clone)]
pub struct AppState {
    pub snapshots: SnapshotReader,
    pub title: Arc<str>,
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/snapshot", get(get_snapshot))
        .route("/snapshot/hash", get(get_hash))
        .route("/environments/:environment", get(get_environment))
        .with_state(state);

    Router::new().nest(API_PREFIX, api)
}

/// The render boundary: always answers, with no snapshot before the first
/// refresh completes.
async fn get_snapshot(State(state): State<AppState>) -> Json<PageView> {
    let snapshot = state.snapshots.get().map(|current| current.snapshot.clone());
    Json(PageView::new(state.title.as_ref(), snapshot))
}

async fn get_hash(State(state): State<AppState>) -> Result<String, StatusCode> {
    state
        .snapshots
        .get()
        .map(|current| current.digest.clone())
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)
}

async fn get_environment(
    State(state): State<AppState>,
    Path(environment): Path<String>,
) -> Result<Json<BTreeMap<String, ReconciliationEntry>>, StatusCode> {
    let current = state
        .snapshots
        .get()
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)?;

    current
        .snapshot
        .environment(&environment)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}
