//! Authentication core: credential and session stores, secret hashing, the
//! auth service and the request guards.
//!
//! The stores are the only shared mutable state. Everything above them goes
//! through [`CredentialStore`] and [`SessionStore`]; in-memory versions are
//! used unless a Postgres DSN is configured.

mod clock;
mod config;
mod credentials;
mod error;
mod guard;
mod hasher;
mod identity;
mod postgres;
mod service;
mod sessions;
mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AuthConfig, MAX_SESSION_TTL_SECONDS};
pub use credentials::{CredentialStore, MemoryCredentialStore};
pub use error::{AuthError, StoreError};
pub use guard::{authenticate, authorize, guard, Principal, RoutePolicy};
pub use hasher::SecretHasher;
pub use identity::{Identity, Role, StoredIdentity, UnknownRole};
pub use postgres::{PgCredentialStore, PgSessionStore};
pub use service::{AuthService, LoginOutcome};
pub use sessions::{MemorySessionStore, SessionStore};

#[cfg(test)]
mod tests;
