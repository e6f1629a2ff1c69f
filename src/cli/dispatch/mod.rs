//! Map parsed CLI arguments to the action the binary runs.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::auth;
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .map(|dsn| dsn.trim().to_string())
        .filter(|dsn| !dsn.is_empty());
    let request_timeout_seconds = matches
        .get_one::<u64>("request-timeout-seconds")
        .copied()
        .unwrap_or(10);

    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        session_ttl_seconds: auth_opts.session_ttl_seconds,
        cookie_secure: auth_opts.cookie_secure,
        request_timeout_seconds,
        session_sweep_seconds: auth_opts.session_sweep_seconds,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_server_with_memory_storage() {
        temp_env::with_vars(
            [
                ("GATEHOUSE_DSN", None::<&str>),
                ("GATEHOUSE_PORT", None::<&str>),
                ("GATEHOUSE_SESSION_TTL_SECONDS", None::<&str>),
                ("GATEHOUSE_REQUEST_TIMEOUT_SECONDS", None::<&str>),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["gatehouse"]);
                let result = handler(&matches);
                assert!(result.is_ok());
                if let Ok(Action::Server(args)) = result {
                    assert_eq!(args.port, 8080);
                    assert_eq!(args.dsn, None);
                    assert_eq!(args.session_ttl_seconds, 86_400);
                    assert_eq!(args.request_timeout_seconds, 10);
                }
            },
        );
    }

    #[test]
    fn blank_dsn_means_memory_storage() {
        temp_env::with_vars([("GATEHOUSE_DSN", Some("  "))], || {
            let matches = crate::cli::commands::new().get_matches_from(vec!["gatehouse"]);
            let result = handler(&matches);
            assert!(matches!(result, Ok(Action::Server(Args { dsn: None, .. }))));
        });
    }

    #[test]
    fn dsn_from_env() {
        temp_env::with_vars(
            [("GATEHOUSE_DSN", Some("postgres://localhost:5432/gatehouse"))],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["gatehouse"]);
                let result = handler(&matches);
                assert!(result.is_ok());
                if let Ok(Action::Server(args)) = result {
                    assert_eq!(
                        args.dsn.as_deref(),
                        Some("postgres://localhost:5432/gatehouse")
                    );
                }
            },
        );
    }
}
