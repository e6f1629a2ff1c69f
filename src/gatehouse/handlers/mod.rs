//! HTTP handlers and the JSON error mapping shared by all of them.

pub mod admin;
pub mod auth;
pub mod health;
pub mod me;
pub mod types;

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use crate::auth::AuthError;

/// Error body returned for every failed request.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials | Self::NoSession | Self::InvalidSession => {
                StatusCode::UNAUTHORIZED
            }
            Self::InsufficientPermissions => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::DuplicateHandle | Self::LastPrivileged => StatusCode::CONFLICT,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &self {
            Self::Storage(source) => {
                error!("storage failure: {source:#}");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            error: self.code().to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

/// Map a JSON extractor rejection to the uniform 400 body.
pub(crate) fn malformed_body(rejection: &JsonRejection) -> AuthError {
    tracing::debug!("rejected request body: {rejection}");
    AuthError::InvalidInput("malformed request body")
}
