//! Postgres implementations of the credential store and principal directories.
//!
//! Schema lives in `sql/schema.sql`. Token uniqueness is enforced by unique
//! indexes; multi-row writes run in a single transaction.

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use sqlx::{postgres::PgRow, Connection, PgPool, Postgres, Row, Transaction};
use tracing::{info_span, Instrument, Span};

use super::{
    model::{
        AccessToken, Client, LinkedRefreshToken, NewAccessToken, NewRefreshToken, Principal,
        RefreshToken,
    },
    password::constant_time_eq,
    principal::PrincipalDirectory,
    store::{CredentialStore, RotationOutcome},
};

fn query_span(operation: &'static str, statement: &'static str) -> Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

#[derive(Clone, Debug)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn client_from_row(row: &PgRow) -> Result<Client> {
    let role: String = row.get("role");
    let secret: String = row.get("client_secret");
    Ok(Client {
        id: row.get("id"),
        name: row.get("name"),
        client_key: row.get("client_key"),
        client_secret: SecretString::from(secret),
        role: role.parse().context("invalid role in oauth_clients")?,
    })
}

fn access_token_from_row(row: &PgRow) -> AccessToken {
    AccessToken {
        id: row.get("id"),
        client_id: row.get("oauth_client_id"),
        principal_id: row.get("principal_id"),
        token: row.get("token"),
        scope: row.get("scope"),
        expires_at: row.get("expired_at"),
    }
}

fn refresh_token_from_row(row: &PgRow) -> RefreshToken {
    RefreshToken {
        id: row.get("id"),
        access_token_id: row.get("oauth_access_token_id"),
        principal_id: row.get("principal_id"),
        token: row.get("token"),
        expires_at: row.get("expired_at"),
    }
}

async fn insert_access_token(
    tx: &mut Transaction<'_, Postgres>,
    new: NewAccessToken,
) -> Result<AccessToken> {
    let query = r"
        INSERT INTO oauth_access_tokens
            (oauth_client_id, principal_id, token, scope, expired_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, oauth_client_id, principal_id, token, scope, expired_at
    ";
    let row = sqlx::query(query)
        .bind(new.client_id)
        .bind(new.principal_id)
        .bind(new.token)
        .bind(new.scope)
        .bind(new.expires_at)
        .fetch_one(&mut **tx)
        .instrument(query_span("INSERT", query))
        .await
        .context("failed to insert access token")?;

    Ok(access_token_from_row(&row))
}

async fn insert_refresh_token(
    tx: &mut Transaction<'_, Postgres>,
    access_token_id: i64,
    new: NewRefreshToken,
) -> Result<RefreshToken> {
    let query = r"
        INSERT INTO oauth_refresh_tokens
            (oauth_access_token_id, principal_id, token, expired_at)
        VALUES ($1, $2, $3, $4)
        RETURNING id, oauth_access_token_id, principal_id, token, expired_at
    ";
    let row = sqlx::query(query)
        .bind(access_token_id)
        .bind(new.principal_id)
        .bind(new.token)
        .bind(new.expires_at)
        .fetch_one(&mut **tx)
        .instrument(query_span("INSERT", query))
        .await
        .context("failed to insert refresh token")?;

    Ok(refresh_token_from_row(&row))
}

async fn delete_refresh_token(tx: &mut Transaction<'_, Postgres>, id: i64) -> Result<u64> {
    let query = "DELETE FROM oauth_refresh_tokens WHERE id = $1";
    let result = sqlx::query(query)
        .bind(id)
        .execute(&mut **tx)
        .instrument(query_span("DELETE", query))
        .await
        .context("failed to delete refresh token")?;

    Ok(result.rows_affected())
}

async fn delete_access_token(tx: &mut Transaction<'_, Postgres>, id: i64) -> Result<u64> {
    let query = "DELETE FROM oauth_access_tokens WHERE id = $1";
    let result = sqlx::query(query)
        .bind(id)
        .execute(&mut **tx)
        .instrument(query_span("DELETE", query))
        .await
        .context("failed to delete access token")?;

    Ok(result.rows_affected())
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn ping(&self) -> Result<()> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self
            .pool
            .acquire()
            .instrument(acquire_span)
            .await
            .context("failed to acquire database connection")?;

        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping()
            .instrument(ping_span)
            .await
            .context("failed to ping database")
    }

    async fn find_client(&self, client_key: &str, client_secret: &str) -> Result<Option<Client>> {
        let query = r"
            SELECT id, name, client_key, client_secret, role
            FROM oauth_clients
            WHERE client_key = $1
        ";
        let row = sqlx::query(query)
            .bind(client_key)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup client")?;

        let client = row.as_ref().map(client_from_row).transpose()?;
        Ok(client.filter(|client| {
            constant_time_eq(
                client.client_secret.expose_secret().as_bytes(),
                client_secret.as_bytes(),
            )
        }))
    }

    async fn find_client_by_id(&self, id: i64) -> Result<Option<Client>> {
        let query = r"
            SELECT id, name, client_key, client_secret, role
            FROM oauth_clients
            WHERE id = $1
        ";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup client by id")?;

        row.as_ref().map(client_from_row).transpose()
    }

    async fn find_access_token(&self, token: &str) -> Result<Option<AccessToken>> {
        let query = r"
            SELECT id, oauth_client_id, principal_id, token, scope, expired_at
            FROM oauth_access_tokens
            WHERE token = $1
        ";
        let row = sqlx::query(query)
            .bind(token)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup access token")?;

        Ok(row.as_ref().map(access_token_from_row))
    }

    async fn find_refresh_token(&self, token: &str) -> Result<Option<LinkedRefreshToken>> {
        let query = r"
            SELECT r.id, r.oauth_access_token_id, r.principal_id, r.token, r.expired_at,
                   a.oauth_client_id,
                   a.principal_id AS access_principal_id,
                   a.token AS access_token,
                   a.scope AS access_scope,
                   a.expired_at AS access_expired_at
            FROM oauth_refresh_tokens r
            JOIN oauth_access_tokens a ON a.id = r.oauth_access_token_id
            WHERE r.token = $1
        ";
        let row = sqlx::query(query)
            .bind(token)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup refresh token")?;

        Ok(row.map(|row| {
            let refresh_token = refresh_token_from_row(&row);
            let access_token = AccessToken {
                id: refresh_token.access_token_id,
                client_id: row.get("oauth_client_id"),
                principal_id: row.get("access_principal_id"),
                token: row.get("access_token"),
                scope: row.get("access_scope"),
                expires_at: row.get("access_expired_at"),
            };
            LinkedRefreshToken {
                refresh_token,
                access_token,
            }
        }))
    }

    async fn create_token_pair(
        &self,
        access_token: NewAccessToken,
        refresh_token: NewRefreshToken,
    ) -> Result<(AccessToken, RefreshToken)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin token pair transaction")?;

        let access_token = insert_access_token(&mut tx, access_token).await?;
        let refresh_token = insert_refresh_token(&mut tx, access_token.id, refresh_token).await?;

        tx.commit().await.context("commit token pair transaction")?;

        Ok((access_token, refresh_token))
    }

    async fn rotate_token_pair(
        &self,
        old: &LinkedRefreshToken,
        access_token: NewAccessToken,
        refresh_token: NewRefreshToken,
    ) -> Result<RotationOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin rotation transaction")?;

        let access_token = insert_access_token(&mut tx, access_token).await?;
        let refresh_token = insert_refresh_token(&mut tx, access_token.id, refresh_token).await?;

        // A concurrent rotation holding the row lock makes this wait; once it
        // commits the row is gone and this rotation must not survive.
        if delete_refresh_token(&mut tx, old.refresh_token.id).await? == 0 {
            tx.rollback().await.context("rollback superseded rotation")?;
            return Ok(RotationOutcome::Superseded);
        }
        delete_access_token(&mut tx, old.access_token.id).await?;

        tx.commit().await.context("commit rotation transaction")?;

        Ok(RotationOutcome::Rotated {
            access_token,
            refresh_token,
        })
    }
}

/// Which table a [`PgPrincipalDirectory`] reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrincipalTable {
    Users,
    Admins,
}

impl PrincipalTable {
    const fn by_email(self) -> &'static str {
        match self {
            Self::Users => "SELECT id, email, name, password FROM users WHERE email = $1",
            Self::Admins => "SELECT id, email, name, password FROM admins WHERE email = $1",
        }
    }

    const fn by_id(self) -> &'static str {
        match self {
            Self::Users => "SELECT id, email, name, password FROM users WHERE id = $1",
            Self::Admins => "SELECT id, email, name, password FROM admins WHERE id = $1",
        }
    }
}

#[derive(Clone, Debug)]
pub struct PgPrincipalDirectory {
    pool: PgPool,
    table: PrincipalTable,
}

impl PgPrincipalDirectory {
    #[must_use]
    pub fn new(pool: PgPool, table: PrincipalTable) -> Self {
        Self { pool, table }
    }
}

fn principal_from_row(row: &PgRow) -> Principal {
    Principal {
        id: row.get("id"),
        email: row.get("email"),
        name: row.get("name"),
        password_hash: row.get("password"),
    }
}

#[async_trait]
impl PrincipalDirectory for PgPrincipalDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>> {
        let query = self.table.by_email();
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup principal by email")?;

        Ok(row.as_ref().map(principal_from_row))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Principal>> {
        let query = self.table.by_id();
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup principal by id")?;

        Ok(row.as_ref().map(principal_from_row))
    }
}

#[cfg(test)]
mod tests {
    use super::PrincipalTable;

    #[test]
    fn principal_queries_target_their_table() {
        assert!(PrincipalTable::Users.by_email().contains("FROM users"));
        assert!(PrincipalTable::Users.by_id().contains("FROM users"));
        assert!(PrincipalTable::Admins.by_email().contains("FROM admins"));
        assert!(PrincipalTable::Admins.by_id().contains("FROM admins"));
    }
}
