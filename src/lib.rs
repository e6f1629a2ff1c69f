//! # Gatehouse (session authentication & role-based access control)
//!
//! `gatehouse` authenticates users by credential, issues opaque session tokens
//! carried in an `HttpOnly` cookie, and gates endpoints by role.
//!
//! ## Identities and roles
//!
//! Every identity holds one of two roles, `standard` or `privileged`. The very
//! first identity ever registered becomes `privileged`; every later one starts
//! as `standard` and can only be promoted by a privileged identity.
//!
//! ## Sessions
//!
//! A successful login creates a session that expires after a fixed TTL
//! (24 hours by default). Each identity has at most one live session: logging
//! in again invalidates the previous token. Only a SHA-256 digest of the token
//! is kept server-side.
//!
//! ## Guards
//!
//! Protected routes run a two-stage guard chain: the session cookie is
//! resolved into a [`auth::Principal`], then the route's [`auth::RoutePolicy`]
//! is checked against the principal's role.

pub mod auth;
pub mod cli;
pub mod gatehouse;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
