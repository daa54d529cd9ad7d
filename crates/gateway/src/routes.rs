use {
    axum::{
        Json,
        extract::{
            Query, State,
            rejection::{JsonRejection, QueryRejection},
        },
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    serde::Deserialize,
    serde_json::json,
    tracing::{debug, error, info},
};

use crate::{
    error::GatewayError,
    groups::{self, GroupRef},
    state::AppState,
};

// ── Request bodies ───────────────────────────────────────────────────────────

/// `POST /send-group` body. Fields are optional so absence maps to a 400
/// with a stable message instead of a deserializer error.
#[derive(Debug, Default, Deserialize)]
pub struct OutboundMessage {
    #[serde(rename = "groupId", default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl OutboundMessage {
    /// Both fields, if both are present and non-empty.
    fn fields(&self) -> Option<(&str, &str)> {
        let group_id = self.group_id.as_deref().filter(|s| !s.is_empty())?;
        let message = self.message.as_deref().filter(|s| !s.is_empty())?;
        Some((group_id, message))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct FindGroupQuery {
    #[serde(default)]
    pub name: Option<String>,
}

// ── Handlers ─────────────────────────────────────────────────────────────────

pub async fn send_group(
    State(state): State<AppState>,
    body: Result<Json<OutboundMessage>, JsonRejection>,
) -> Result<Response, GatewayError> {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            debug!(error = %rejection, "unreadable send-group body");
            OutboundMessage::default()
        },
    };
    let (group_id, message) = body.fields().ok_or(GatewayError::MissingFields)?;

    match state.session.send_message(group_id, message).await {
        Ok(()) => {
            info!(group_id, "message sent");
            Ok(Json(json!({
                "success": true,
                "message": format!("Pesan berhasil dikirim ke grup {group_id}"),
            }))
            .into_response())
        },
        Err(e) => {
            error!(group_id, error = %e, "failed to send message");
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": e.to_string() })),
            )
                .into_response())
        },
    }
}

pub async fn list_groups(
    State(state): State<AppState>,
) -> Result<Json<Vec<GroupRef>>, GatewayError> {
    let chats = state.session.chats().await?;
    Ok(Json(groups::list_groups(chats)))
}

pub async fn find_group(
    State(state): State<AppState>,
    query: Result<Query<FindGroupQuery>, QueryRejection>,
) -> Result<Json<Vec<GroupRef>>, GatewayError> {
    let name = query
        .ok()
        .and_then(|Query(q)| q.name)
        .filter(|n| !n.is_empty())
        .ok_or(GatewayError::MissingName)?;

    let chats = state.session.chats().await?;
    let found = groups::find_groups(chats, &name);
    if found.is_empty() {
        return Err(GatewayError::GroupNotFound(name));
    }
    Ok(Json(found))
}

pub async fn session_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.session.status().await)
}

pub async fn fallback() -> GatewayError {
    GatewayError::UnknownRoute
}
