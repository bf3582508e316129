//! In-process credential store and principal directory.
//!
//! Same semantics as the Postgres implementations: unique token strings, one
//! refresh token per access token, atomic pair creation and rotation. Used by
//! tests and for running the service without a database.

use anyhow::{bail, Result};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::{
    model::{
        AccessToken, Client, LinkedRefreshToken, NewAccessToken, NewRefreshToken, Principal,
        RefreshToken,
    },
    password::constant_time_eq,
    principal::PrincipalDirectory,
    store::{CredentialStore, RotationOutcome},
};

#[derive(Default)]
struct Tables {
    clients: Vec<Client>,
    access_tokens: HashMap<i64, AccessToken>,
    refresh_tokens: HashMap<i64, RefreshToken>,
    next_id: i64,
    writes: u64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn insert_access_token(&mut self, new: NewAccessToken) -> Result<AccessToken> {
        if self.access_tokens.values().any(|row| row.token == new.token) {
            bail!("duplicate key value violates unique constraint on oauth_access_tokens.token");
        }
        let row = AccessToken {
            id: self.next_id(),
            client_id: new.client_id,
            principal_id: new.principal_id,
            token: new.token,
            scope: new.scope,
            expires_at: new.expires_at,
        };
        self.access_tokens.insert(row.id, row.clone());
        self.writes += 1;
        Ok(row)
    }

    fn insert_refresh_token(
        &mut self,
        access_token_id: i64,
        new: NewRefreshToken,
    ) -> Result<RefreshToken> {
        if self.refresh_tokens.values().any(|row| row.token == new.token) {
            bail!("duplicate key value violates unique constraint on oauth_refresh_tokens.token");
        }
        if self
            .refresh_tokens
            .values()
            .any(|row| row.access_token_id == access_token_id)
        {
            bail!("access token {access_token_id} already has a refresh token");
        }
        let row = RefreshToken {
            id: self.next_id(),
            access_token_id,
            principal_id: new.principal_id,
            token: new.token,
            expires_at: new.expires_at,
        };
        self.refresh_tokens.insert(row.id, row.clone());
        self.writes += 1;
        Ok(row)
    }

    fn delete_refresh_token(&mut self, id: i64) -> bool {
        let deleted = self.refresh_tokens.remove(&id).is_some();
        if deleted {
            self.writes += 1;
        }
        deleted
    }

    fn delete_access_token(&mut self, id: i64) -> bool {
        let deleted = self.access_tokens.remove(&id).is_some();
        if deleted {
            self.writes += 1;
        }
        deleted
    }
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    tables: Mutex<Tables>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a client. Client provisioning is outside the token protocol.
    ///
    /// # Errors
    /// Returns an error if the client key is already registered.
    pub async fn insert_client(&self, client: Client) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if tables
            .clients
            .iter()
            .any(|row| row.client_key == client.client_key)
        {
            bail!("client key {} already registered", client.client_key);
        }
        tables.next_id = tables.next_id.max(client.id);
        tables.clients.push(client);
        Ok(())
    }

    pub async fn access_token_count(&self) -> usize {
        self.tables.lock().await.access_tokens.len()
    }

    pub async fn refresh_token_count(&self) -> usize {
        self.tables.lock().await.refresh_tokens.len()
    }

    /// Number of token rows inserted or deleted so far.
    pub async fn write_count(&self) -> u64 {
        self.tables.lock().await.writes
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn find_client(&self, client_key: &str, client_secret: &str) -> Result<Option<Client>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .clients
            .iter()
            .find(|row| row.client_key == client_key)
            .filter(|row| {
                constant_time_eq(
                    row.client_secret.expose_secret().as_bytes(),
                    client_secret.as_bytes(),
                )
            })
            .cloned())
    }

    async fn find_client_by_id(&self, id: i64) -> Result<Option<Client>> {
        let tables = self.tables.lock().await;
        Ok(tables.clients.iter().find(|row| row.id == id).cloned())
    }

    async fn find_access_token(&self, token: &str) -> Result<Option<AccessToken>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .access_tokens
            .values()
            .find(|row| row.token == token)
            .cloned())
    }

    async fn find_refresh_token(&self, token: &str) -> Result<Option<LinkedRefreshToken>> {
        let tables = self.tables.lock().await;
        let Some(refresh_token) = tables
            .refresh_tokens
            .values()
            .find(|row| row.token == token)
            .cloned()
        else {
            return Ok(None);
        };
        // Inner join: an orphaned refresh token is not found.
        Ok(tables
            .access_tokens
            .get(&refresh_token.access_token_id)
            .cloned()
            .map(|access_token| LinkedRefreshToken {
                refresh_token,
                access_token,
            }))
    }

    async fn create_token_pair(
        &self,
        access_token: NewAccessToken,
        refresh_token: NewRefreshToken,
    ) -> Result<(AccessToken, RefreshToken)> {
        let mut tables = self.tables.lock().await;
        let access_token = tables.insert_access_token(access_token)?;
        match tables.insert_refresh_token(access_token.id, refresh_token) {
            Ok(refresh_token) => Ok((access_token, refresh_token)),
            Err(err) => {
                tables.delete_access_token(access_token.id);
                Err(err)
            }
        }
    }

    async fn rotate_token_pair(
        &self,
        old: &LinkedRefreshToken,
        access_token: NewAccessToken,
        refresh_token: NewRefreshToken,
    ) -> Result<RotationOutcome> {
        // The lock is held for the whole rotation, which makes it a transaction.
        let mut tables = self.tables.lock().await;
        if !tables
            .refresh_tokens
            .contains_key(&old.refresh_token.id)
        {
            return Ok(RotationOutcome::Superseded);
        }

        let access_token = tables.insert_access_token(access_token)?;
        let refresh_token = match tables.insert_refresh_token(access_token.id, refresh_token) {
            Ok(row) => row,
            Err(err) => {
                tables.delete_access_token(access_token.id);
                return Err(err);
            }
        };

        tables.delete_refresh_token(old.refresh_token.id);
        tables.delete_access_token(old.access_token.id);

        Ok(RotationOutcome::Rotated {
            access_token,
            refresh_token,
        })
    }
}

#[derive(Default)]
pub struct MemoryPrincipalDirectory {
    principals: Mutex<Vec<Principal>>,
}

impl MemoryPrincipalDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a principal, replacing any existing one with the same id.
    ///
    /// # Errors
    /// Returns an error if another principal already uses the email.
    pub async fn upsert(&self, principal: Principal) -> Result<()> {
        let mut principals = self.principals.lock().await;
        if principals
            .iter()
            .any(|row| row.id != principal.id && row.email == principal.email)
        {
            bail!("email {} already registered", principal.email);
        }
        principals.retain(|row| row.id != principal.id);
        principals.push(principal);
        Ok(())
    }

    pub async fn remove(&self, id: i64) {
        self.principals.lock().await.retain(|row| row.id != id);
    }
}

#[async_trait]
impl PrincipalDirectory for MemoryPrincipalDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>> {
        let principals = self.principals.lock().await;
        Ok(principals.iter().find(|row| row.email == email).cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Principal>> {
        let principals = self.principals.lock().await;
        Ok(principals.iter().find(|row| row.id == id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use crate::oauth::model::{ClientRole, DEFAULT_SCOPE};
    use chrono::{Duration, Utc};
    use secrecy::SecretString;

    fn client() -> Client {
        Client {
            id: 2,
            name: "web".to_string(),
            client_key: "k".to_string(),
            client_secret: SecretString::from("s".to_string()),
            role: ClientRole::User,
        }
    }

    fn new_access(token: &str) -> NewAccessToken {
        NewAccessToken {
            client_id: 2,
            principal_id: 7,
            token: token.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            expires_at: Utc::now() + Duration::days(1),
        }
    }

    fn new_refresh(token: &str) -> NewRefreshToken {
        NewRefreshToken {
            principal_id: 7,
            token: token.to_string(),
            expires_at: Utc::now() + Duration::days(2),
        }
    }

    #[tokio::test]
    async fn find_client_requires_matching_secret() -> Result<()> {
        let store = MemoryCredentialStore::new();
        store.insert_client(client()).await?;
        assert!(store.find_client("k", "s").await?.is_some());
        assert!(store.find_client("k", "wrong").await?.is_none());
        assert!(store.find_client("k", "").await?.is_none());
        assert!(store.find_client("k", "s ").await?.is_none());
        assert!(store.find_client("other", "s").await?.is_none());
        assert!(store.insert_client(client()).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn create_pair_links_refresh_to_access() -> Result<()> {
        let store = MemoryCredentialStore::new();
        store.insert_client(client()).await?;
        let (access, refresh) = store
            .create_token_pair(new_access("a1"), new_refresh("r1"))
            .await?;
        assert_eq!(refresh.access_token_id, access.id);

        let linked = store.find_refresh_token("r1").await?;
        assert_eq!(
            linked.map(|linked| linked.access_token),
            Some(access.clone())
        );
        assert_eq!(store.find_access_token("a1").await?, Some(access));
        assert_eq!(store.write_count().await, 2);
        Ok(())
    }

    #[tokio::test]
    async fn orphaned_refresh_token_is_not_found() -> Result<()> {
        let store = MemoryCredentialStore::new();
        let (access, _) = store
            .create_token_pair(new_access("a1"), new_refresh("r1"))
            .await?;
        store.tables.lock().await.access_tokens.remove(&access.id);

        assert!(store.find_refresh_token("r1").await?.is_none());
        assert_eq!(store.refresh_token_count().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_token_strings_are_rejected_without_partial_rows() -> Result<()> {
        let store = MemoryCredentialStore::new();
        store
            .create_token_pair(new_access("a1"), new_refresh("r1"))
            .await?;

        assert!(store
            .create_token_pair(new_access("a1"), new_refresh("r2"))
            .await
            .is_err());
        assert!(store
            .create_token_pair(new_access("a2"), new_refresh("r1"))
            .await
            .is_err());
        assert_eq!(store.access_token_count().await, 1);
        assert_eq!(store.refresh_token_count().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn rotation_replaces_pair_once() -> Result<()> {
        let store = MemoryCredentialStore::new();
        store
            .create_token_pair(new_access("a1"), new_refresh("r1"))
            .await?;
        let old = store
            .find_refresh_token("r1")
            .await?
            .ok_or_else(|| anyhow!("missing refresh token"))?;

        let outcome = store
            .rotate_token_pair(&old, new_access("a2"), new_refresh("r2"))
            .await?;
        assert!(matches!(outcome, RotationOutcome::Rotated { .. }));
        assert!(store.find_refresh_token("r1").await?.is_none());
        assert!(store.find_access_token("a1").await?.is_none());
        assert!(store.find_refresh_token("r2").await?.is_some());

        let replay = store
            .rotate_token_pair(&old, new_access("a3"), new_refresh("r3"))
            .await?;
        assert_eq!(replay, RotationOutcome::Superseded);
        assert_eq!(store.access_token_count().await, 1);
        assert_eq!(store.refresh_token_count().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn principal_directory_upsert_and_lookup() -> Result<()> {
        let directory = MemoryPrincipalDirectory::new();
        let principal = Principal {
            id: 7,
            email: "a@x.com".to_string(),
            name: "Ada".to_string(),
            password_hash: String::new(),
        };
        directory.upsert(principal.clone()).await?;
        assert!(directory.find_by_email("a@x.com").await?.is_some());

        directory
            .upsert(Principal {
                name: "Ada L.".to_string(),
                ..principal.clone()
            })
            .await?;
        let found = directory.find_by_id(7).await?;
        assert_eq!(found.map(|p| p.name), Some("Ada L.".to_string()));

        assert!(directory
            .upsert(Principal {
                id: 8,
                ..principal
            })
            .await
            .is_err());

        directory.remove(7).await;
        assert!(directory.find_by_id(7).await?.is_none());
        Ok(())
    }
}
