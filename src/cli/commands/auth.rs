use clap::{Arg, Command};

pub const ARG_TOKEN_SECRET: &str = "token-secret";
pub const ARG_PREFIX: &str = "prefix";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_COOKIE_NAME: &str = "cookie-name";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_token_args(command);
    with_cookie_args(command)
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TOKEN_SECRET)
                .long(ARG_TOKEN_SECRET)
                .help("Secret used to sign session tokens (at least 32 bytes)")
                .long_help(
                    "Secret used to sign session tokens (at least 32 bytes). Rotating it logs every user out.",
                )
                .env("SESSA_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session token and cookie lifetime in seconds")
                .env("SESSA_SESSION_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
}

fn with_cookie_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PREFIX)
                .long(ARG_PREFIX)
                .help("Route prefix for the auth endpoints")
                .env("SESSA_PREFIX")
                .default_value("/auth"),
        )
        .arg(
            Arg::new(ARG_COOKIE_NAME)
                .long(ARG_COOKIE_NAME)
                .help("Name of the session cookie")
                .env("SESSA_COOKIE_NAME")
                .default_value("sessa_session"),
        )
        .arg(
            Arg::new(ARG_COOKIE_SECURE)
                .long(ARG_COOKIE_SECURE)
                .help("Mark the session cookie Secure (serve over HTTPS)")
                .env("SESSA_COOKIE_SECURE")
                .action(clap::ArgAction::SetTrue),
        )
}
