use chrono::TimeDelta;

const DEFAULT_SESSION_TTL_SECONDS: i64 = 24 * 60 * 60;
/// Longest accepted session lifetime: one year.
pub const MAX_SESSION_TTL_SECONDS: i64 = 365 * 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    session_ttl_seconds: i64,
    session_cookie_secure: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            session_cookie_secure: true,
        }
    }

    /// Values are clamped to `1..=MAX_SESSION_TTL_SECONDS`.
    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds.clamp(1, MAX_SESSION_TTL_SECONDS);
        self
    }

    #[must_use]
    pub fn with_session_cookie_secure(mut self, secure: bool) -> Self {
        self.session_cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn session_ttl(&self) -> TimeDelta {
        TimeDelta::try_seconds(self.session_ttl_seconds)
            .unwrap_or_else(|| TimeDelta::days(365))
    }

    /// Only mark cookies `Secure` when served over HTTPS.
    #[must_use]
    pub fn session_cookie_secure(&self) -> bool {
        self.session_cookie_secure
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_one_day_secure_sessions() {
        let config = AuthConfig::default();
        assert_eq!(config.session_ttl_seconds(), 86_400);
        assert_eq!(config.session_ttl(), TimeDelta::hours(24));
        assert!(config.session_cookie_secure());
    }

    #[test]
    fn builders_override_defaults() {
        let config = AuthConfig::new()
            .with_session_ttl_seconds(60)
            .with_session_cookie_secure(false);
        assert_eq!(config.session_ttl(), TimeDelta::minutes(1));
        assert!(!config.session_cookie_secure());
    }

    #[test]
    fn out_of_range_ttl_is_clamped() {
        let config = AuthConfig::new().with_session_ttl_seconds(i64::MAX);
        assert_eq!(config.session_ttl_seconds(), MAX_SESSION_TTL_SECONDS);
        assert_eq!(config.session_ttl(), TimeDelta::days(365));

        let config = AuthConfig::new().with_session_ttl_seconds(-5);
        assert_eq!(config.session_ttl(), TimeDelta::seconds(1));
    }
}
