use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::{Router, routing::get};

use crate::bootstrap::app_context::AppContext;
use crate::domain::documents::DocumentKind;
use crate::infrastructure::realtime::{self, ClientIdentity, MAX_MESSAGE_SIZE};

// Uses AppContext as router state. Authentication and visibility decisions
// happen at the HTTP edge; these handlers only read the forwarded headers.

#[utoipa::path(
    get,
    path = "/ws/views/{id}",
    params(
        ("id" = String, Path, description = "View ID (UUID)"),
        ("X-User-ID" = String, Header, description = "Authenticated user, asserted by the edge"),
        ("X-User-Name" = Option<String>, Header, description = "Display name"),
        ("X-View-Type" = Option<String>, Header, description = "View kind when the record is not yet visible here"),
        ("X-Read-Only" = Option<String>, Header, description = "true|false")
    ),
    responses(
        (status = 101, description = "Switching Protocols (WebSocket upgrade)"),
        (status = 401, description = "Missing identity headers"),
        (status = 404, description = "Unknown view")
    ),
    tag = "Realtime"
)]
pub async fn view_ws(
    Path(view_id): Path<String>,
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppContext>,
) -> Result<Response, StatusCode> {
    serve_view(view_id, ws, headers, state, false).await
}

#[utoipa::path(
    get,
    path = "/ws/public/views/{id}",
    params(("id" = String, Path, description = "View ID (UUID)")),
    responses(
        (status = 101, description = "Switching Protocols (WebSocket upgrade)"),
        (status = 403, description = "View is not public"),
        (status = 404, description = "Unknown view")
    ),
    tag = "Realtime"
)]
pub async fn public_view_ws(
    Path(view_id): Path<String>,
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppContext>,
) -> Result<Response, StatusCode> {
    serve_view(view_id, ws, headers, state, true).await
}

#[utoipa::path(
    get,
    path = "/ws/notes/{id}",
    params(
        ("id" = String, Path, description = "Note ID (UUID)"),
        ("X-User-ID" = String, Header, description = "Authenticated user, asserted by the edge"),
        ("X-Read-Only" = Option<String>, Header, description = "true|false")
    ),
    responses(
        (status = 101, description = "Switching Protocols (WebSocket upgrade)"),
        (status = 401, description = "Missing identity headers"),
        (status = 404, description = "Unknown note")
    ),
    tag = "Realtime"
)]
pub async fn note_ws(
    Path(note_id): Path<String>,
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppContext>,
) -> Result<Response, StatusCode> {
    let identity = identity_from_headers(&headers, false).ok_or(StatusCode::UNAUTHORIZED)?;

    let note = state
        .document_store()
        .find_note(&note_id)
        .await
        .map_err(|e| {
            tracing::error!(document_id = %note_id, error = ?e, "note_lookup_failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    if note.is_none() {
        return Err(StatusCode::NOT_FOUND);
    }

    let room = state.hub().get_or_create(&note_id, DocumentKind::Note).await;
    Ok(ws
        .max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| realtime::serve(socket, identity, room)))
}

async fn serve_view(
    view_id: String,
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    state: AppContext,
    public: bool,
) -> Result<Response, StatusCode> {
    // y-websocket appends the room name to the URL; keep the first segment.
    let view_id = view_id.split('/').next().unwrap_or_default().to_string();
    if view_id.is_empty() {
        return Err(StatusCode::NOT_FOUND);
    }

    let identity = identity_from_headers(&headers, public).ok_or(StatusCode::UNAUTHORIZED)?;

    let record = state
        .document_store()
        .find_view(&view_id)
        .await
        .map_err(|e| {
            tracing::error!(document_id = %view_id, error = ?e, "view_lookup_failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let kind = match record {
        Some(view) => {
            if public && !view.is_public {
                return Err(StatusCode::FORBIDDEN);
            }
            view.kind
        }
        None => {
            if public {
                return Err(StatusCode::NOT_FOUND);
            }
            // Behind a reverse-proxy edge the record may live elsewhere; the
            // edge tells us the kind and carries the access decision.
            headers
                .get("x-view-type")
                .and_then(|v| v.to_str().ok())
                .and_then(DocumentKind::parse)
                .ok_or(StatusCode::NOT_FOUND)?
        }
    };

    let room = state.hub().get_or_create(&view_id, kind).await;
    Ok(ws
        .max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| realtime::serve(socket, identity, room)))
}

fn identity_from_headers(headers: &HeaderMap, public: bool) -> Option<ClientIdentity> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    };

    let user_id = match header("x-user-id").filter(|v| !v.is_empty()) {
        Some(user_id) => user_id,
        // Public endpoints admit anonymous spectators.
        None if public => "anonymous".to_string(),
        None => return None,
    };
    let user_name = header("x-user-name").unwrap_or_default();
    let read_only = public
        || header("x-read-only")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

    Some(ClientIdentity {
        user_id,
        user_name,
        read_only,
    })
}

pub fn routes(state: AppContext) -> Router {
    Router::new()
        .route("/ws/views/:id", get(view_ws))
        .route("/ws/public/views/:id", get(public_view_ws))
        .route("/ws/notes/:id", get(note_ws))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderMap;

    use super::identity_from_headers;

    #[test]
    fn identity_requires_user_id_on_private_endpoints() {
        let headers = HeaderMap::new();
        assert!(identity_from_headers(&headers, false).is_none());
    }

    #[test]
    fn public_endpoints_force_read_only() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", "u1".parse().unwrap());
        headers.insert("x-read-only", "false".parse().unwrap());
        let identity = identity_from_headers(&headers, true).unwrap();
        assert!(identity.read_only);
    }

    #[test]
    fn read_only_header_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", "u1".parse().unwrap());
        headers.insert("x-user-name", "Ada".parse().unwrap());
        headers.insert("x-read-only", "TRUE".parse().unwrap());
        let identity = identity_from_headers(&headers, false).unwrap();
        assert_eq!(identity.user_name, "Ada");
        assert!(identity.read_only);
    }
}
