use axum::{Json, Router, extract::State, routing::get};

use crate::bootstrap::app_context::AppContext;
use crate::infrastructure::realtime::HubStats;

#[utoipa::path(
    get,
    path = "/api/ws/stats",
    tag = "Realtime",
    responses((status = 200, body = HubStats))
)]
pub async fn hub_stats(State(state): State<AppContext>) -> Json<HubStats> {
    Json(state.hub().stats().await)
}

pub fn routes(state: AppContext) -> Router {
    Router::new()
        .route("/ws/stats", get(hub_stats))
        .with_state(state)
}
