use {
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    groupcast_whatsapp::SessionError,
    serde_json::json,
    tracing::error,
};

/// Request failures and the HTTP answer each one maps to.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Parameter 'groupId' dan 'message' wajib diisi.")]
    MissingFields,

    #[error("Parameter 'name' wajib diisi.")]
    MissingName,

    #[error("Grup dengan nama '{0}' tidak ditemukan.")]
    GroupNotFound(String),

    #[error("Endpoint tidak ditemukan.")]
    UnknownRoute,

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingFields | Self::MissingName => StatusCode::BAD_REQUEST,
            Self::GroupNotFound(_) | Self::UnknownRoute => StatusCode::NOT_FOUND,
            Self::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        if let Self::Session(ref e) = self {
            error!(error = %e, "whatsapp request failed");
        }
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
