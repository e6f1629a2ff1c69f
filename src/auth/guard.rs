//! Two-stage request guard: authenticate the session, then authorize the role.
//!
//! Flow Overview:
//! 1) `authenticate`: token → identity, or `NoSession` / `InvalidSession`.
//! 2) `authorize`: the route's [`RoutePolicy`] against the principal's role,
//!    or `InsufficientPermissions`.
//!
//! Both stages only read state. Route policies are plain constants, so the
//! role requirements of every endpoint are visible in one place.

use super::{
    error::AuthError,
    identity::{Identity, Role},
    service::AuthService,
};

/// Authenticated caller attached to the request after stage 1.
#[derive(Clone, Debug)]
pub struct Principal {
    pub identity: Identity,
    /// Raw token the caller presented; needed to close this session.
    pub token: String,
}

/// Role requirement declared per route. An empty set admits any session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoutePolicy {
    pub name: &'static str,
    pub required_roles: &'static [Role],
}

impl RoutePolicy {
    /// Any authenticated identity.
    pub const AUTHENTICATED: Self = Self {
        name: "authenticated",
        required_roles: &[],
    };

    /// Administrative routes.
    pub const PRIVILEGED: Self = Self {
        name: "privileged",
        required_roles: &[Role::Privileged],
    };

    #[must_use]
    pub fn permits(&self, role: Role) -> bool {
        self.required_roles.is_empty() || self.required_roles.contains(&role)
    }
}

/// Stage 1: resolve the presented token into a principal.
///
/// # Errors
/// `NoSession` without a token, `InvalidSession` for unknown or expired ones,
/// `Storage` on backend failures.
pub async fn authenticate(
    service: &AuthService,
    token: Option<&str>,
) -> Result<Principal, AuthError> {
    let token = token
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::NoSession)?;
    let identity = service
        .resolve_session(token)
        .await?
        .ok_or(AuthError::InvalidSession)?;
    Ok(Principal {
        identity,
        token: token.to_string(),
    })
}

/// Stage 2: check the principal's role against the route policy.
///
/// # Errors
/// `InsufficientPermissions` when the role is not in the policy's set.
pub fn authorize(principal: Principal, policy: &RoutePolicy) -> Result<Principal, AuthError> {
    if policy.permits(principal.identity.role) {
        Ok(principal)
    } else {
        Err(AuthError::InsufficientPermissions)
    }
}

/// Run both stages in order.
///
/// # Errors
/// Whatever the first failing stage reports.
pub async fn guard(
    service: &AuthService,
    token: Option<&str>,
    policy: &RoutePolicy,
) -> Result<Principal, AuthError> {
    let principal = authenticate(service, token).await?;
    authorize(principal, policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn principal(role: Role) -> Principal {
        Principal {
            identity: Identity {
                id: Uuid::new_v4(),
                handle: "a@x.com".to_string(),
                role,
                created_at: Utc::now(),
            },
            token: "token".to_string(),
        }
    }

    #[test]
    fn authenticated_policy_admits_every_role() {
        assert!(RoutePolicy::AUTHENTICATED.permits(Role::Standard));
        assert!(RoutePolicy::AUTHENTICATED.permits(Role::Privileged));
    }

    #[test]
    fn privileged_policy_admits_only_privileged() {
        assert!(RoutePolicy::PRIVILEGED.permits(Role::Privileged));
        assert!(!RoutePolicy::PRIVILEGED.permits(Role::Standard));
    }

    #[test]
    fn authorize_rejects_role_mismatch() {
        let result = authorize(principal(Role::Standard), &RoutePolicy::PRIVILEGED);
        assert!(matches!(result, Err(AuthError::InsufficientPermissions)));

        let result = authorize(principal(Role::Privileged), &RoutePolicy::PRIVILEGED);
        assert!(result.is_ok());
    }
}
