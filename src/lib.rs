//! # Tessera
//!
//! `tessera` issues OAuth-style credentials to registered clients on behalf of
//! users and administrators.
//!
//! - `POST /api/v1/oauths` exchanges client credentials plus a principal's
//!   email and password for an HS256 JWT access token and an opaque refresh
//!   token.
//! - `POST /api/v1/oauths/refresh` rotates a refresh token: the presented pair
//!   is deleted and a brand-new pair is issued in one transaction, so a
//!   refresh token can be redeemed exactly once.
//! - `GET /api/v1/oauths/me` returns the claims of a live access token.
//!
//! A client's role (`admin` or `user`) selects the principal table consulted at
//! login and sets the `isAdmin` claim.
//!
//! ## Secrets
//!
//! With `--vault-url` set, database credentials come from the Vault database
//! secrets engine and the JWT signing secret from a KV v2 entry; both leases
//! are renewed in the background and the server shuts down when renewal fails.
//! Without Vault the DSN and `--jwt-secret` are used as given.
//!
//! The schema lives in `sql/schema.sql`.

pub mod api;
pub mod cli;
pub mod notify;
pub mod oauth;
pub mod vault;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{ensure, Context, Result};
    use std::fs;
    use std::path::PathBuf;

    // Normalize SQL to avoid brittle formatting checks in schema tests.
    fn canonical_schema() -> Result<String> {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("sql/schema.sql");
        let sql = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read SQL file at {}", path.display()))?;
        Ok(sql
            .chars()
            .filter(|ch| !ch.is_whitespace())
            .map(|ch| ch.to_ascii_lowercase())
            .collect())
    }

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn schema_sql_integrity() -> Result<()> {
        let canonical = canonical_schema()?;
        for table in [
            "oauth_clients",
            "users",
            "admins",
            "oauth_access_tokens",
            "oauth_refresh_tokens",
        ] {
            ensure!(
                canonical.contains(&format!("createtableifnotexists{table}(")),
                "missing table {table}"
            );
        }
        ensure!(
            canonical.contains("check(rolein('admin','user'))"),
            "client role constraint missing"
        );
        ensure!(
            canonical.contains("tokentextnotnullunique"),
            "token columns must be unique"
        );
        ensure!(
            canonical.contains("oauth_access_token_idbigintnotnulluniquereferencesoauth_access_tokens(id)ondeletecascade"),
            "refresh token must cascade with its access token"
        );
        Ok(())
    }
}
