//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to the action to run: the token server by
//! default, or one of the operator subcommands.

use crate::cli::actions::{hash_password, server::Args, Action};
use crate::cli::commands::{notify, token, vault, CMD_HASH_PASSWORD, CMD_OPENAPI};
use crate::oauth::config::DEFAULT_BCRYPT_COST;
use anyhow::{Context, Result};

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    match matches.subcommand() {
        Some((CMD_HASH_PASSWORD, sub)) => {
            let cost = sub
                .get_one::<u32>(token::ARG_BCRYPT_COST)
                .copied()
                .unwrap_or(DEFAULT_BCRYPT_COST);
            return Ok(Action::HashPassword(hash_password::Args { cost }));
        }
        Some((CMD_OPENAPI, _)) => return Ok(Action::OpenApi),
        _ => {}
    }

    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    crate::cli::commands::validate(matches).map_err(|e| anyhow::anyhow!(e))?;

    let vault_opts = vault::Options::parse(matches)?;
    let token_opts = token::Options::parse(matches)?;
    let notify_opts = notify::Options::parse(matches);

    if vault_opts.is_none() && token_opts.jwt_secret.is_none() {
        anyhow::bail!("missing required argument: --{}", token::ARG_JWT_SECRET);
    }

    Ok(Action::Server(Args {
        port,
        dsn,
        jwt_secret: token_opts.jwt_secret,
        access_token_ttl_seconds: token_opts.access_token_ttl_seconds,
        refresh_token_ttl_seconds: token_opts.refresh_token_ttl_seconds,
        notify_queue_size: notify_opts.queue_size,
        notify_max_attempts: notify_opts.max_attempts,
        notify_backoff_base_seconds: notify_opts.backoff_base_seconds,
        notify_backoff_max_seconds: notify_opts.backoff_max_seconds,
        vault: vault_opts,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    const DSN: &str = "postgres://user@localhost:5432/tessera";

    #[test]
    fn server_action_from_env() {
        temp_env::with_vars(
            [
                ("TESSERA_DSN", Some(DSN)),
                ("TESSERA_JWT_SECRET", Some("top-secret")),
                ("TESSERA_NOTIFY_QUEUE_SIZE", Some("8")),
                ("TESSERA_VAULT_URL", None::<&str>),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["tessera"]);
                let action = handler(&matches);
                assert!(action.is_ok());
                if let Ok(Action::Server(args)) = action {
                    assert_eq!(args.dsn, DSN);
                    assert_eq!(args.notify_queue_size, 8);
                    assert!(args.vault.is_none());
                    assert_eq!(
                        args.jwt_secret.as_ref().map(|s| s.expose_secret().to_string()),
                        Some("top-secret".to_string())
                    );
                } else {
                    panic!("expected server action");
                }
            },
        );
    }

    #[test]
    fn empty_jwt_secret_rejected() {
        temp_env::with_vars(
            [
                ("TESSERA_DSN", Some(DSN)),
                ("TESSERA_JWT_SECRET", Some("  ")),
                ("TESSERA_VAULT_URL", None::<&str>),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["tessera"]);
                let result = handler(&matches);
                assert!(result
                    .err()
                    .is_some_and(|e| e.to_string().contains("--jwt-secret")));
            },
        );
    }

    #[test]
    fn non_positive_ttl_rejected() {
        temp_env::with_vars(
            [
                ("TESSERA_DSN", Some(DSN)),
                ("TESSERA_JWT_SECRET", Some("top-secret")),
                ("TESSERA_REFRESH_TOKEN_TTL_SECONDS", Some("0")),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["tessera"]);
                assert!(handler(&matches).is_err());
            },
        );
    }

    #[test]
    fn vault_options_parsed() {
        temp_env::with_vars(
            [
                ("TESSERA_DSN", Some(DSN)),
                ("TESSERA_JWT_SECRET", None::<&str>),
                (
                    "TESSERA_VAULT_URL",
                    Some("http://127.0.0.1:8200/v1/auth/approle/login"),
                ),
                ("TESSERA_VAULT_ROLE_ID", Some("role-id")),
                ("TESSERA_VAULT_WRAPPED_TOKEN", Some("wrapped")),
                ("TESSERA_VAULT_SECRET_ID", None::<&str>),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["tessera"]);
                match handler(&matches) {
                    Ok(Action::Server(args)) => {
                        let vault = args.vault.as_ref();
                        assert_eq!(vault.map(|v| v.role_id.as_str()), Some("role-id"));
                        assert_eq!(
                            vault.and_then(|v| v.wrapped_token.as_deref()),
                            Some("wrapped")
                        );
                        assert_eq!(vault.map(|v| v.kv_mount.as_str()), Some("secret/tessera"));
                        assert!(args.jwt_secret.is_none());
                    }
                    _ => panic!("expected server action"),
                }
            },
        );
    }

    #[test]
    fn hash_password_action() {
        temp_env::with_vars([("TESSERA_BCRYPT_COST", None::<&str>)], || {
            let matches =
                crate::cli::commands::new().get_matches_from(vec!["tessera", "hash-password"]);
            match handler(&matches) {
                Ok(Action::HashPassword(args)) => assert_eq!(args.cost, DEFAULT_BCRYPT_COST),
                _ => panic!("expected hash-password action"),
            }
        });
    }
}
