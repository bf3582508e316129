use anyhow::Result;
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::oauth::config::{DEFAULT_ACCESS_TOKEN_TTL_SECONDS, DEFAULT_REFRESH_TOKEN_TTL_SECONDS};

pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_ACCESS_TOKEN_TTL_SECONDS: &str = "access-token-ttl-seconds";
pub const ARG_REFRESH_TOKEN_TTL_SECONDS: &str = "refresh-token-ttl-seconds";
pub const ARG_BCRYPT_COST: &str = "bcrypt-cost";

// clap defaults are string literals; kept in sync with `oauth::config`.
const DEFAULT_ACCESS_TOKEN_TTL_ARG: &str = "31536000";
const DEFAULT_REFRESH_TOKEN_TTL_ARG: &str = "31622400";
const DEFAULT_BCRYPT_COST_ARG: &str = "12";

pub struct Options {
    pub jwt_secret: Option<SecretString>,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
}

impl Options {
    /// Parse token arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a lifetime is not positive.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let jwt_secret = matches
            .get_one::<String>(ARG_JWT_SECRET)
            .filter(|v| !v.trim().is_empty())
            .map(|v| SecretString::from(v.clone()));

        let read_ttl = |id: &str, default: i64| -> Result<i64> {
            let value = matches.get_one::<i64>(id).copied().unwrap_or(default);
            if value <= 0 {
                anyhow::bail!("--{id} must be greater than zero");
            }
            Ok(value)
        };

        Ok(Self {
            jwt_secret,
            access_token_ttl_seconds: read_ttl(
                ARG_ACCESS_TOKEN_TTL_SECONDS,
                DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
            )?,
            refresh_token_ttl_seconds: read_ttl(
                ARG_REFRESH_TOKEN_TTL_SECONDS,
                DEFAULT_REFRESH_TOKEN_TTL_SECONDS,
            )?,
        })
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "***"))
            .field("access_token_ttl_seconds", &self.access_token_ttl_seconds)
            .field("refresh_token_ttl_seconds", &self.refresh_token_ttl_seconds)
            .finish()
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("HS256 signing secret for access tokens (read from Vault KV when --vault-url is set)")
                .env("TESSERA_JWT_SECRET")
                .hide_env_values(true)
                .required_unless_present(super::vault::ARG_VAULT_URL),
        )
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_TTL_SECONDS)
                .long(ARG_ACCESS_TOKEN_TTL_SECONDS)
                .help("Access token lifetime in seconds")
                .env("TESSERA_ACCESS_TOKEN_TTL_SECONDS")
                .default_value(DEFAULT_ACCESS_TOKEN_TTL_ARG)
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_TTL_SECONDS)
                .long(ARG_REFRESH_TOKEN_TTL_SECONDS)
                .help("Refresh token lifetime in seconds")
                .env("TESSERA_REFRESH_TOKEN_TTL_SECONDS")
                .default_value(DEFAULT_REFRESH_TOKEN_TTL_ARG)
                .value_parser(clap::value_parser!(i64)),
        )
}

/// Arguments of the `hash-password` subcommand.
#[must_use]
pub fn hash_password_command() -> Command {
    Command::new("hash-password")
        .about("Read a password from stdin and print its bcrypt hash")
        .arg(
            Arg::new(ARG_BCRYPT_COST)
                .long(ARG_BCRYPT_COST)
                .help("bcrypt cost factor (4-31)")
                .env("TESSERA_BCRYPT_COST")
                .default_value(DEFAULT_BCRYPT_COST_ARG)
                .value_parser(clap::value_parser!(u32).range(4..=31)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::config::DEFAULT_BCRYPT_COST;

    #[test]
    fn default_args_match_config() {
        assert_eq!(
            DEFAULT_ACCESS_TOKEN_TTL_ARG.parse::<i64>().ok(),
            Some(DEFAULT_ACCESS_TOKEN_TTL_SECONDS)
        );
        assert_eq!(
            DEFAULT_REFRESH_TOKEN_TTL_ARG.parse::<i64>().ok(),
            Some(DEFAULT_REFRESH_TOKEN_TTL_SECONDS)
        );
        assert_eq!(
            DEFAULT_BCRYPT_COST_ARG.parse::<u32>().ok(),
            Some(DEFAULT_BCRYPT_COST)
        );
    }

    #[test]
    fn defaults_apply_without_flags() {
        temp_env::with_vars(
            [
                ("TESSERA_ACCESS_TOKEN_TTL_SECONDS", None::<&str>),
                ("TESSERA_REFRESH_TOKEN_TTL_SECONDS", None::<&str>),
                ("TESSERA_JWT_SECRET", None::<&str>),
                ("TESSERA_BCRYPT_COST", None::<&str>),
                ("TESSERA_VAULT_URL", None::<&str>),
            ],
            || {
                let command = crate::cli::commands::vault::with_args(with_args(Command::new(
                    "tessera",
                )));
                let matches = command.try_get_matches_from(vec!["tessera", "--jwt-secret", "s"]);
                let options = matches
                    .map_err(anyhow::Error::from)
                    .and_then(|m| Options::parse(&m));
                match options {
                    Ok(options) => {
                        assert_eq!(
                            options.access_token_ttl_seconds,
                            DEFAULT_ACCESS_TOKEN_TTL_SECONDS
                        );
                        assert_eq!(
                            options.refresh_token_ttl_seconds,
                            DEFAULT_REFRESH_TOKEN_TTL_SECONDS
                        );
                    }
                    Err(e) => panic!("unexpected error: {e}"),
                }

                let sub = hash_password_command().try_get_matches_from(vec!["hash-password"]);
                assert_eq!(
                    sub.ok().and_then(|m| m.get_one::<u32>(ARG_BCRYPT_COST).copied()),
                    Some(DEFAULT_BCRYPT_COST)
                );
            },
        );
    }
}
