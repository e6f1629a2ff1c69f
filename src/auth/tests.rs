use chrono::{TimeDelta, TimeZone, Utc};
use secrecy::SecretString;
use std::sync::Arc;

use super::*;

struct Harness {
    service: Arc<AuthService>,
    clock: Arc<ManualClock>,
}

fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
    ));
    let credentials = Arc::new(MemoryCredentialStore::new(clock.clone()));
    let sessions = Arc::new(MemorySessionStore::new(TimeDelta::hours(1), clock.clone()));
    let hasher = SecretHasher::with_cost(1024, 1).expect("hasher");
    Harness {
        service: Arc::new(AuthService::new(credentials, sessions, hasher)),
        clock,
    }
}

fn secret(value: &str) -> SecretString {
    SecretString::from(value.to_string())
}

#[tokio::test]
async fn first_registration_is_privileged_and_later_ones_are_not() {
    let h = harness();
    let first = h.service.register("a@x.com", &secret("pw1")).await.unwrap();
    let second = h.service.register("b@x.com", &secret("pw2")).await.unwrap();
    let third = h.service.register("c@x.com", &secret("pw3")).await.unwrap();

    assert_eq!(first.role, Role::Privileged);
    assert_eq!(second.role, Role::Standard);
    assert_eq!(third.role, Role::Standard);
}

#[tokio::test]
async fn concurrent_first_registrations_yield_one_privileged_identity() {
    let h = harness();
    let mut tasks = Vec::new();
    for index in 0..8 {
        let service = h.service.clone();
        tasks.push(tokio::spawn(async move {
            service
                .register(&format!("user{index}@x.com"), &secret("pw"))
                .await
        }));
    }

    let mut privileged = 0;
    for task in tasks {
        if task.await.unwrap().unwrap().role == Role::Privileged {
            privileged += 1;
        }
    }
    assert_eq!(privileged, 1);
}

#[tokio::test]
async fn duplicate_handle_is_rejected_without_state_change() {
    let h = harness();
    h.service.register("a@x.com", &secret("pw1")).await.unwrap();
    let err = h
        .service
        .register(" a@x.com ", &secret("other"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::DuplicateHandle));
    assert_eq!(h.service.list_identities().await.unwrap().len(), 1);

    // The original secret still works.
    assert!(h.service.login("a@x.com", &secret("pw1")).await.is_ok());
}

#[tokio::test]
async fn malformed_input_is_rejected() {
    let h = harness();
    let err = h
        .service
        .register("not-an-email", &secret("pw"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidInput(_)));

    let err = h.service.register("a@x.com", &secret("")).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidInput(_)));
    assert!(h.service.list_identities().await.unwrap().is_empty());
}

#[tokio::test]
async fn login_then_resolve_round_trips_to_the_same_identity() {
    let h = harness();
    let registered = h.service.register("a@x.com", &secret("pw1")).await.unwrap();
    let outcome = h.service.login("a@x.com", &secret("pw1")).await.unwrap();

    let resolved = h.service.resolve_session(&outcome.token).await.unwrap();
    assert_eq!(resolved, Some(registered));
}

#[tokio::test]
async fn unknown_handle_and_wrong_secret_fail_identically() {
    let h = harness();
    h.service.register("a@x.com", &secret("pw1")).await.unwrap();

    let wrong_secret = h
        .service
        .login("a@x.com", &secret("nope"))
        .await
        .unwrap_err();
    let unknown = h
        .service
        .login("ghost@x.com", &secret("pw1"))
        .await
        .unwrap_err();

    assert!(matches!(wrong_secret, AuthError::InvalidCredentials));
    assert!(matches!(unknown, AuthError::InvalidCredentials));
    assert_eq!(wrong_secret.to_string(), unknown.to_string());
    assert_eq!(wrong_secret.code(), unknown.code());
}

#[tokio::test]
async fn new_login_invalidates_the_previous_session() {
    let h = harness();
    h.service.register("a@x.com", &secret("pw1")).await.unwrap();
    let first = h.service.login("a@x.com", &secret("pw1")).await.unwrap();
    let second = h.service.login("a@x.com", &secret("pw1")).await.unwrap();

    assert_ne!(first.token, second.token);
    assert_eq!(h.service.resolve_session(&first.token).await.unwrap(), None);
    assert!(h
        .service
        .resolve_session(&second.token)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn logout_is_idempotent() {
    let h = harness();
    h.service.register("a@x.com", &secret("pw1")).await.unwrap();
    let outcome = h.service.login("a@x.com", &secret("pw1")).await.unwrap();

    h.service.logout(&outcome.token).await.unwrap();
    h.service.logout(&outcome.token).await.unwrap();
    h.service.logout("never-issued").await.unwrap();
    assert_eq!(h.service.resolve_session(&outcome.token).await.unwrap(), None);
}

#[tokio::test]
async fn sessions_expire_after_the_ttl() {
    let h = harness();
    h.service.register("a@x.com", &secret("pw1")).await.unwrap();
    let outcome = h.service.login("a@x.com", &secret("pw1")).await.unwrap();

    h.clock.advance(TimeDelta::minutes(59));
    assert!(h
        .service
        .resolve_session(&outcome.token)
        .await
        .unwrap()
        .is_some());

    h.clock.advance(TimeDelta::minutes(1));
    assert_eq!(h.service.resolve_session(&outcome.token).await.unwrap(), None);

    let err = guard(&h.service, Some(&outcome.token), &RoutePolicy::AUTHENTICATED)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidSession));
}

#[tokio::test]
async fn promotion_scenario() {
    let h = harness();
    let a = h.service.register("a@x.com", &secret("pw1")).await.unwrap();
    let b = h.service.register("b@x.com", &secret("pw2")).await.unwrap();
    assert_eq!(a.role, Role::Privileged);
    assert_eq!(b.role, Role::Standard);

    let b_session = h.service.login("b@x.com", &secret("pw2")).await.unwrap();
    let err = guard(&h.service, Some(&b_session.token), &RoutePolicy::PRIVILEGED)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InsufficientPermissions));

    let a_session = h.service.login("a@x.com", &secret("pw1")).await.unwrap();
    let admin = guard(&h.service, Some(&a_session.token), &RoutePolicy::PRIVILEGED)
        .await
        .unwrap();
    let promoted = h
        .service
        .set_role(&admin.identity, b.id, Role::Privileged)
        .await
        .unwrap();
    assert_eq!(promoted.role, Role::Privileged);

    // The existing session picks up the new role on its next request.
    let b_admin = guard(&h.service, Some(&b_session.token), &RoutePolicy::PRIVILEGED)
        .await
        .unwrap();
    assert_eq!(b_admin.identity.id, b.id);
}

#[tokio::test]
async fn standard_actor_cannot_change_roles() {
    let h = harness();
    let a = h.service.register("a@x.com", &secret("pw1")).await.unwrap();
    let b = h.service.register("b@x.com", &secret("pw2")).await.unwrap();

    let err = h
        .service
        .set_role(&b, a.id, Role::Standard)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InsufficientPermissions));
}

#[tokio::test]
async fn last_privileged_identity_cannot_be_demoted() {
    let h = harness();
    let a = h.service.register("a@x.com", &secret("pw1")).await.unwrap();
    h.service.register("b@x.com", &secret("pw2")).await.unwrap();

    let err = h
        .service
        .set_role(&a, a.id, Role::Standard)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::LastPrivileged));

    // Same-role assignment is a no-op rather than an error.
    let unchanged = h
        .service
        .set_role(&a, a.id, Role::Privileged)
        .await
        .unwrap();
    assert_eq!(unchanged.role, Role::Privileged);
}

#[tokio::test]
async fn demotion_allowed_once_another_identity_is_privileged() {
    let h = harness();
    let a = h.service.register("a@x.com", &secret("pw1")).await.unwrap();
    let b = h.service.register("b@x.com", &secret("pw2")).await.unwrap();

    h.service.set_role(&a, b.id, Role::Privileged).await.unwrap();
    let demoted = h.service.set_role(&a, a.id, Role::Standard).await.unwrap();
    assert_eq!(demoted.role, Role::Standard);
}

#[tokio::test]
async fn unknown_target_is_not_found() {
    let h = harness();
    let a = h.service.register("a@x.com", &secret("pw1")).await.unwrap();
    let err = h
        .service
        .set_role(&a, uuid::Uuid::new_v4(), Role::Standard)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotFound));
}

#[tokio::test]
async fn missing_token_is_no_session() {
    let h = harness();
    let err = authenticate(&h.service, None).await.unwrap_err();
    assert!(matches!(err, AuthError::NoSession));

    let err = authenticate(&h.service, Some("   ")).await.unwrap_err();
    assert!(matches!(err, AuthError::NoSession));

    let err = authenticate(&h.service, Some("garbage")).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidSession));
}

#[tokio::test]
async fn logout_everywhere_closes_the_live_session() {
    let h = harness();
    let a = h.service.register("a@x.com", &secret("pw1")).await.unwrap();
    let outcome = h.service.login("a@x.com", &secret("pw1")).await.unwrap();

    h.service.logout_everywhere(a.id).await.unwrap();
    assert_eq!(h.service.resolve_session(&outcome.token).await.unwrap(), None);
}

#[tokio::test]
async fn purge_removes_only_expired_sessions() {
    let h = harness();
    h.service.register("a@x.com", &secret("pw1")).await.unwrap();
    h.service.register("b@x.com", &secret("pw2")).await.unwrap();
    h.service.login("a@x.com", &secret("pw1")).await.unwrap();

    h.clock.advance(TimeDelta::minutes(30));
    let fresh = h.service.login("b@x.com", &secret("pw2")).await.unwrap();

    h.clock.advance(TimeDelta::minutes(45));
    assert_eq!(h.service.purge_expired_sessions().await.unwrap(), 1);
    assert!(h
        .service
        .resolve_session(&fresh.token)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn session_for_missing_identity_is_invalid() {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let credentials = Arc::new(MemoryCredentialStore::new(clock.clone()));
    let sessions = Arc::new(MemorySessionStore::new(TimeDelta::hours(1), clock));
    let service = AuthService::new(
        credentials,
        sessions.clone(),
        SecretHasher::with_cost(1024, 1).expect("hasher"),
    );

    let orphan = sessions.create(uuid::Uuid::new_v4()).await.unwrap();
    assert_eq!(service.resolve_session(&orphan).await.unwrap(), None);

    let err = authenticate(&service, Some(&orphan)).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidSession));
}
