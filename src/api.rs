//! api.rs
//! Rutas HTTP: /health y /speeds (último snapshot del ciclo de refresco).

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::{compression::CompressionLayer, cors::CorsLayer};

use crate::types::DataState;

#[derive(Clone)]
pub struct ApiState { pub data: Arc<RwLock<DataState>> }

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/speeds", get(speeds))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
}

/// 204 hasta que termine el primer ciclo
async fn speeds(State(st): State<ApiState>) -> impl IntoResponse {
    let d = st.data.read().await;
    match &d.snapshot {
        Some(s) => Json(s.clone()).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}
