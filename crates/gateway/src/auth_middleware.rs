use {
    axum::{
        Json,
        extract::{Request, State},
        middleware::Next,
        response::{IntoResponse, Response},
    },
    serde_json::json,
    tracing::warn,
};

use crate::state::AppState;

/// Bearer-token gate in front of every route.
pub async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    match state.auth.authorize_bearer(request.headers()) {
        Ok(()) => next.run(request).await,
        Err(failure) => {
            warn!(
                reason = failure.reason(),
                method = %request.method(),
                path = %request.uri().path(),
                "unauthorized request"
            );
            (failure.status(), Json(json!({ "error": failure.message() }))).into_response()
        },
    }
}
