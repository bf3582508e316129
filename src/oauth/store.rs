//! Credential store contract.
//!
//! Tokens are append/rotate-only: rows are created in pairs and deleted in pairs,
//! never updated in place. Token strings are unique and the store enforces it;
//! a collision comes back as an error, never as a silent overwrite.
//!
//! Both multi-row writes run atomically. `create_token_pair` inserts the access
//! token and its refresh token together. `rotate_token_pair` inserts the new pair
//! and then deletes the old refresh and access tokens; if the old refresh token
//! has already been consumed by a concurrent rotation, nothing is written and
//! the outcome is [`RotationOutcome::Superseded`].

use anyhow::Result;
use async_trait::async_trait;

use super::model::{
    AccessToken, Client, LinkedRefreshToken, NewAccessToken, NewRefreshToken, RefreshToken,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RotationOutcome {
    Rotated {
        access_token: AccessToken,
        refresh_token: RefreshToken,
    },
    Superseded,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Check that the backing storage is reachable.
    async fn ping(&self) -> Result<()>;

    async fn find_client(&self, client_key: &str, client_secret: &str) -> Result<Option<Client>>;

    async fn find_client_by_id(&self, id: i64) -> Result<Option<Client>>;

    async fn find_access_token(&self, token: &str) -> Result<Option<AccessToken>>;

    /// Look up a refresh token and eagerly load the access token it references.
    async fn find_refresh_token(&self, token: &str) -> Result<Option<LinkedRefreshToken>>;

    async fn create_token_pair(
        &self,
        access_token: NewAccessToken,
        refresh_token: NewRefreshToken,
    ) -> Result<(AccessToken, RefreshToken)>;

    async fn rotate_token_pair(
        &self,
        old: &LinkedRefreshToken,
        access_token: NewAccessToken,
        refresh_token: NewRefreshToken,
    ) -> Result<RotationOutcome>;
}
