//! Privileged identity administration.
//!
//! The router only reaches these handlers after the privileged policy passed;
//! `set_role` still hands the actor to the service, which re-checks the role
//! under the directory lock.

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use super::{
    malformed_body,
    types::{IdentityResponse, RoleRequest},
    ErrorBody,
};
use crate::auth::{AuthError, AuthService, Principal, Role};

#[utoipa::path(
    get,
    path = "/admin/users",
    responses(
        (status = 200, description = "All identities in creation order.", body = [IdentityResponse]),
        (status = 401, description = "Missing or invalid session.", body = ErrorBody),
        (status = 403, description = "Caller is not privileged.", body = ErrorBody),
    ),
    tag = "admin"
)]
pub async fn list_users(
    Extension(auth): Extension<Arc<AuthService>>,
) -> Result<Json<Vec<IdentityResponse>>, AuthError> {
    let identities = auth.list_identities().await?;
    Ok(Json(
        identities.into_iter().map(IdentityResponse::from).collect(),
    ))
}

#[utoipa::path(
    patch,
    path = "/admin/users/{id}/role",
    params(
        ("id" = String, Path, description = "Identity id (UUID)")
    ),
    request_body = RoleRequest,
    responses(
        (status = 200, description = "Role updated.", body = IdentityResponse),
        (status = 400, description = "Malformed id or role.", body = ErrorBody),
        (status = 401, description = "Missing or invalid session.", body = ErrorBody),
        (status = 403, description = "Caller is not privileged.", body = ErrorBody),
        (status = 404, description = "Identity not found.", body = ErrorBody),
        (status = 409, description = "Would demote the last privileged identity.", body = ErrorBody),
    ),
    tag = "admin"
)]
pub async fn set_role(
    Extension(auth): Extension<Arc<AuthService>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    payload: Result<Json<RoleRequest>, JsonRejection>,
) -> Result<Json<IdentityResponse>, AuthError> {
    let Ok(target_id) = Uuid::parse_str(&id) else {
        return Err(AuthError::InvalidInput("id must be a UUID"));
    };
    let Json(request) = payload.map_err(|rejection| malformed_body(&rejection))?;
    let role: Role = request
        .role
        .parse()
        .map_err(|_| AuthError::InvalidInput("role must be standard or privileged"))?;

    let updated = auth.set_role(&principal.identity, target_id, role).await?;
    Ok(Json(IdentityResponse::from(updated)))
}
