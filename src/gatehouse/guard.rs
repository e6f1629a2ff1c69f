//! Route-level middleware running the auth guard pipeline.
//!
//! Each protected sub-router is wrapped with `require_policy` and its
//! [`RoutePolicy`]; on success the [`Principal`] is inserted into the request
//! extensions for handlers to extract.
//!
//! A request may carry both a session cookie and a bearer token. They are
//! tried in that order and the first one that resolves wins, so a stale
//! header cannot shadow a live cookie.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, error};

use super::session::session_token_candidates;
use crate::auth::{authenticate, authorize, AuthError, AuthService, Principal, RoutePolicy};

pub(crate) async fn require_policy(
    State(policy): State<RoutePolicy>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(auth) = request.extensions().get::<Arc<AuthService>>().cloned() else {
        error!("auth service missing from request extensions");
        return AuthError::Storage(anyhow::anyhow!("auth service not configured")).into_response();
    };

    let tokens = session_token_candidates(request.headers());
    let verdict = authenticate_any(&auth, &tokens)
        .await
        .and_then(|principal| authorize(principal, &policy));
    match verdict {
        Ok(principal) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(err) => {
            debug!(policy = policy.name, code = err.code(), "request rejected by guard");
            err.into_response()
        }
    }
}

/// Authenticate with the first candidate that resolves. Storage failures stop
/// the search; with no candidates the result is `NoSession`.
async fn authenticate_any(auth: &AuthService, tokens: &[String]) -> Result<Principal, AuthError> {
    let mut outcome = Err(AuthError::NoSession);
    for token in tokens {
        outcome = authenticate(auth, Some(token.as_str())).await;
        match outcome {
            Err(AuthError::InvalidSession | AuthError::NoSession) => {}
            _ => break,
        }
    }
    outcome
}
