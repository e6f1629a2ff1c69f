use axum::{extract::Extension, Json};

use super::{types::MeResponse, ErrorBody};
use crate::auth::Principal;

#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "The authenticated identity.", body = MeResponse),
        (status = 401, description = "Missing or invalid session.", body = ErrorBody),
    ),
    tag = "me"
)]
pub async fn me(Extension(principal): Extension<Principal>) -> Json<MeResponse> {
    let identity = principal.identity;
    Json(MeResponse {
        id: identity.id.to_string(),
        handle: identity.handle,
        role: identity.role,
    })
}
