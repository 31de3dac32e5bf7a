use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::{Json, Router, extract::State, routing::post};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::bootstrap::app_context::AppContext;
use crate::infrastructure::fetch::{FetchedBody, safe_fetch};

#[derive(Debug, Deserialize, ToSchema)]
pub struct FetchRequest {
    pub url: String,
}

#[utoipa::path(
    post,
    path = "/api/tools/fetch-url",
    tag = "Tools",
    request_body = FetchRequest,
    responses(
        (status = 200, description = "Fetched body, content type passed through"),
        (status = 400, description = "URL rejected or unreachable")
    )
)]
pub async fn fetch_url(
    State(_state): State<AppContext>,
    Json(req): Json<FetchRequest>,
) -> Result<(HeaderMap, Vec<u8>), (StatusCode, &'static str)> {
    proxy_fetch(&req.url).await
}

/// Feed proxy: same hardened fetch; parsing happens on the client, this
/// endpoint exists so browsers are not stopped by CORS and the server is
/// not exposed to SSRF.
#[utoipa::path(
    post,
    path = "/api/tools/fetch-rss",
    tag = "Tools",
    request_body = FetchRequest,
    responses(
        (status = 200, description = "Feed body, content type passed through"),
        (status = 400, description = "URL rejected or unreachable")
    )
)]
pub async fn fetch_rss(
    State(_state): State<AppContext>,
    Json(req): Json<FetchRequest>,
) -> Result<(HeaderMap, Vec<u8>), (StatusCode, &'static str)> {
    proxy_fetch(&req.url).await
}

// Failures map to an opaque 400; details stay in the logs.
async fn proxy_fetch(url: &str) -> Result<(HeaderMap, Vec<u8>), (StatusCode, &'static str)> {
    match safe_fetch(url).await {
        Ok(FetchedBody { body, content_type }) => {
            let mut headers = HeaderMap::new();
            let value = content_type
                .as_deref()
                .and_then(|ct| HeaderValue::from_str(ct).ok())
                .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
            headers.insert(header::CONTENT_TYPE, value);
            Ok((headers, body))
        }
        Err(e) => {
            tracing::warn!(error = %e, "url_fetch_rejected");
            Err((StatusCode::BAD_REQUEST, "URL could not be fetched"))
        }
    }
}

pub fn routes(state: AppContext) -> Router {
    Router::new()
        .route("/tools/fetch-url", post(fetch_url))
        .route("/tools/fetch-rss", post(fetch_rss))
        .with_state(state)
}
