use axum::middleware::from_fn_with_state;
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

use super::{
    guard::require_policy,
    handlers::{admin, auth, health, me},
};
use crate::auth::RoutePolicy;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Routes are grouped by [`RoutePolicy`]; each protected group carries the
/// guard as a route layer so unmatched paths still 404 instead of 401.
///
/// Logout is session-guarded too: repeating it with a token that is already
/// closed answers 401 `invalid_session` every time. Closing an absent session
/// is a no-op only at the service layer.
pub(crate) fn api_router() -> OpenApiRouter {
    let public = OpenApiRouter::new()
        .routes(routes!(health::health))
        .routes(routes!(auth::register))
        .routes(routes!(auth::login));

    let authenticated = OpenApiRouter::new()
        .routes(routes!(auth::logout))
        .routes(routes!(me::me))
        .route_layer(from_fn_with_state(
            RoutePolicy::AUTHENTICATED,
            require_policy,
        ));

    let privileged = OpenApiRouter::new()
        .routes(routes!(admin::list_users))
        .routes(routes!(admin::set_role))
        .route_layer(from_fn_with_state(RoutePolicy::PRIVILEGED, require_policy));

    let mut router = OpenApiRouter::with_openapi(cargo_openapi())
        .merge(public)
        .merge(authenticated)
        .merge(privileged);

    let tags = [
        ("auth", "Registration, login and logout"),
        ("me", "The authenticated identity"),
        ("admin", "Identity and role administration (privileged)"),
        ("health", "Service and storage health"),
    ]
    .into_iter()
    .map(|(name, description)| {
        let mut tag = Tag::new(name);
        tag.description = Some(description.to_string());
        tag
    })
    .collect();
    router.get_openapi_mut().tags = Some(tags);

    router
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    OpenApiBuilder::new().info(info).build()
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `:` separated and may include "Name <email>".
    let primary = env!("CARGO_PKG_AUTHORS").split(':').next().map(str::trim)?;
    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    match author.split_once('<') {
        Some((name, rest)) => (
            optional_str(name),
            optional_str(rest.trim_end().trim_end_matches('>')),
        ),
        None => (optional_str(author), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let doc = openapi();
        assert_eq!(doc.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(doc.info.version, env!("CARGO_PKG_VERSION"));

        let contact = doc.info.contact.expect("contact");
        assert_eq!(contact.name.as_deref(), Some("Team Gatehouse"));
        assert_eq!(contact.email.as_deref(), Some("team@gatehouse.dev"));

        let license = doc.info.license.expect("license");
        assert_eq!(license.identifier.as_deref(), Some("BSD-3-Clause"));
    }

    #[test]
    fn openapi_documents_every_route() {
        let doc = openapi();
        for path in [
            "/health",
            "/auth/register",
            "/auth/login",
            "/auth/logout",
            "/me",
            "/admin/users",
            "/admin/users/{id}/role",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let tags = doc.tags.unwrap_or_default();
        assert!(tags.iter().any(|tag| tag.name == "admin"));
    }

    #[test]
    fn parse_author_variants() {
        assert_eq!(
            parse_author("Jane Doe <jane@x.com>"),
            (Some("Jane Doe"), Some("jane@x.com"))
        );
        assert_eq!(parse_author("Jane Doe"), (Some("Jane Doe"), None));
        assert_eq!(parse_author("<jane@x.com>"), (None, Some("jane@x.com")));
        assert_eq!(parse_author("  "), (None, None));
    }
}
