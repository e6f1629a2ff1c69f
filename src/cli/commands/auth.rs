//! Session and hashing arguments.

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};

use crate::auth::MAX_SESSION_TTL_SECONDS;

pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";
pub const ARG_SESSION_SWEEP_SECONDS: &str = "session-sweep-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    pub session_ttl_seconds: i64,
    pub cookie_secure: bool,
    pub session_sweep_seconds: u64,
}

impl Options {
    /// Parse auth-related CLI arguments.
    ///
    /// # Errors
    /// Returns an error if a required argument is missing.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        let session_ttl_seconds = matches
            .get_one::<i64>(ARG_SESSION_TTL_SECONDS)
            .copied()
            .context("missing required argument: --session-ttl-seconds")?;
        let cookie_secure = matches
            .get_one::<bool>(ARG_COOKIE_SECURE)
            .copied()
            .unwrap_or(true);
        let session_sweep_seconds = matches
            .get_one::<u64>(ARG_SESSION_SWEEP_SECONDS)
            .copied()
            .context("missing required argument: --session-sweep-seconds")?;

        Ok(Self {
            session_ttl_seconds,
            cookie_secure,
            session_sweep_seconds,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session lifetime in seconds (at most one year)")
                .env("GATEHOUSE_SESSION_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64).range(1..=MAX_SESSION_TTL_SECONDS)),
        )
        .arg(
            Arg::new(ARG_COOKIE_SECURE)
                .long(ARG_COOKIE_SECURE)
                .help("Mark the session cookie Secure (disable only for plain HTTP development)")
                .env("GATEHOUSE_COOKIE_SECURE")
                .default_value("true")
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(bool)),
        )
        .arg(
            Arg::new(ARG_SESSION_SWEEP_SECONDS)
                .long(ARG_SESSION_SWEEP_SECONDS)
                .help("Interval between expired-session sweeps in seconds")
                .env("GATEHOUSE_SESSION_SWEEP_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
