//! Register, login and logout endpoints.

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::error;

use super::{
    malformed_body,
    types::{CredentialsRequest, IdentityResponse, MessageResponse},
    ErrorBody,
};
use crate::{
    auth::{AuthConfig, AuthError, AuthService, Principal},
    gatehouse::session::{clear_session_cookie, session_cookie},
};

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = CredentialsRequest,
    responses(
        (status = 201, description = "Identity created. The first identity is privileged.", body = IdentityResponse),
        (status = 400, description = "Malformed handle or secret.", body = ErrorBody),
        (status = 409, description = "Handle already registered.", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn register(
    Extension(auth): Extension<Arc<AuthService>>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Response, AuthError> {
    let Json(request) = payload.map_err(|rejection| malformed_body(&rejection))?;
    let (handle, secret) = request.into_parts();

    let identity = auth.register(&handle, &secret).await?;
    Ok((StatusCode::CREATED, Json(IdentityResponse::from(identity))).into_response())
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Session opened; token set in the session cookie.", body = IdentityResponse),
        (status = 400, description = "Malformed request body.", body = ErrorBody),
        (status = 401, description = "Invalid credentials.", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn login(
    Extension(auth): Extension<Arc<AuthService>>,
    Extension(config): Extension<AuthConfig>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Response, AuthError> {
    let Json(request) = payload.map_err(|rejection| malformed_body(&rejection))?;
    let (handle, secret) = request.into_parts();

    let outcome = auth.login(&handle, &secret).await?;

    let cookie = match session_cookie(&config, &outcome.token) {
        Ok(cookie) => cookie,
        Err(err) => {
            // Do not leave a session behind that the client never received.
            if let Err(logout_err) = auth.logout(&outcome.token).await {
                error!("Failed to close unusable session: {logout_err}");
            }
            return Err(AuthError::Storage(anyhow::Error::new(err)));
        }
    };

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);
    Ok((
        StatusCode::OK,
        headers,
        Json(IdentityResponse::from(outcome.identity)),
    )
        .into_response())
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Session closed and cookie cleared.", body = MessageResponse),
        (status = 401, description = "Missing or invalid session.", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn logout(
    Extension(auth): Extension<Arc<AuthService>>,
    Extension(config): Extension<AuthConfig>,
    Extension(principal): Extension<Principal>,
) -> Result<Response, AuthError> {
    auth.logout(&principal.token).await?;

    // Always clear the cookie once the session is gone.
    let mut headers = HeaderMap::new();
    match clear_session_cookie(&config) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build clearing cookie: {err}"),
    }
    let body = MessageResponse {
        message: "logged out".to_string(),
    };
    Ok((StatusCode::OK, headers, Json(body)).into_response())
}
