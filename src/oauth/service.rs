//! Login, refresh-token rotation and access-token introspection.
//!
//! ### Rotation
//!
//! A refresh token is `Active` until it is either rotated (the old pair is
//! deleted and a new pair takes its place) or found expired (rejected, rows
//! left in place). Rotation is a single store transaction: when two refreshes
//! race on the same token, the store lets exactly one delete the old pair and
//! the other comes back as `InvalidToken`.

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::{fmt, sync::Arc};
use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};

use super::{
    error::AuthError,
    model::{Client, NewAccessToken, NewRefreshToken, Principal, TokenPair, DEFAULT_SCOPE},
    password::{hash_password_blocking, BcryptVerifier, PasswordVerifier},
    principal::Directories,
    store::{CredentialStore, RotationOutcome},
    token::{Claims, TokenIssuer},
};
use crate::notify::{Notification, NotificationQueue};

/// Client and principal credentials presented at login.
pub struct LoginCommand {
    pub client_key: String,
    pub client_secret: SecretString,
    pub email: String,
    pub password: SecretString,
}

impl fmt::Debug for LoginCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCommand")
            .field("client_key", &self.client_key)
            .field("client_secret", &"***")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    directories: Directories,
    issuer: TokenIssuer,
    notifications: Option<NotificationQueue>,
    verifier: Arc<dyn PasswordVerifier>,
    // Hash checked when the email is unknown, so both rejections cost one bcrypt verify.
    dummy_hash: OnceCell<String>,
}

impl AuthService {
    #[must_use]
    pub fn new(
        store: Arc<dyn CredentialStore>,
        directories: Directories,
        issuer: TokenIssuer,
    ) -> Self {
        Self {
            store,
            directories,
            issuer,
            notifications: None,
            verifier: Arc::new(BcryptVerifier),
            dummy_hash: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn with_password_verifier(mut self, verifier: Arc<dyn PasswordVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Enqueue a sign-in notification on every successful login.
    #[must_use]
    pub fn with_notifications(mut self, queue: NotificationQueue) -> Self {
        self.notifications = Some(queue);
        self
    }

    #[must_use]
    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Check that the credential store is reachable.
    ///
    /// # Errors
    /// Returns the store error when it is not.
    pub async fn ping(&self) -> anyhow::Result<()> {
        self.store.ping().await
    }

    /// Exchange client and principal credentials for a new token pair.
    ///
    /// # Errors
    /// `InvalidClient` for an unknown client pair, `InvalidCredentials` for an
    /// unknown email or wrong password, `Internal` for store failures.
    pub async fn login(&self, command: LoginCommand) -> Result<TokenPair, AuthError> {
        self.login_at(command, Utc::now()).await
    }

    /// [`login`](Self::login) with an explicit clock.
    ///
    /// # Errors
    /// See [`login`](Self::login).
    #[instrument(skip(self, command), fields(client_key = %command.client_key, email = %command.email))]
    pub async fn login_at(
        &self,
        command: LoginCommand,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, AuthError> {
        let client = self
            .store
            .find_client(&command.client_key, command.client_secret.expose_secret())
            .await?
            .ok_or(AuthError::InvalidClient)?;

        let Some(principal) = self
            .directories
            .for_role(client.role)
            .find_by_email(&command.email)
            .await?
        else {
            let hash = self.dummy_hash().await?;
            let _ = self.verifier.verify(command.password, hash).await;
            debug!("unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        if !self
            .verifier
            .verify(command.password, principal.password_hash.clone())
            .await?
        {
            debug!(principal_id = principal.id, "password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        let (access_token, refresh_token) = self.mint_pair(&client, &principal, now)?;
        let (access_token, refresh_token) = self
            .store
            .create_token_pair(access_token, refresh_token)
            .await?;

        debug!(
            principal_id = principal.id,
            client_id = client.id,
            role = %client.role,
            "issued token pair"
        );

        if let Some(queue) = &self.notifications {
            queue.submit(Notification::sign_in(
                &principal.email,
                &principal.name,
                &client.name,
            ));
        }

        Ok(TokenPair::new(access_token, refresh_token))
    }

    /// Rotate a refresh token into a new pair.
    ///
    /// # Errors
    /// `InvalidToken` for an unknown, already rotated or orphaned token,
    /// `TokenExpired` once its expiry has passed, `Internal` for store failures.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        self.refresh_at(refresh_token, Utc::now()).await
    }

    /// [`refresh`](Self::refresh) with an explicit clock.
    ///
    /// # Errors
    /// See [`refresh`](Self::refresh).
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh_at(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, AuthError> {
        let linked = self
            .store
            .find_refresh_token(refresh_token)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if linked.refresh_token.expires_at <= now {
            debug!(
                refresh_token_id = linked.refresh_token.id,
                "refresh token expired"
            );
            return Err(AuthError::TokenExpired);
        }

        let Some(client) = self
            .store
            .find_client_by_id(linked.access_token.client_id)
            .await?
        else {
            warn!(
                client_id = linked.access_token.client_id,
                "refresh token belongs to a removed client"
            );
            return Err(AuthError::InvalidToken);
        };

        let Some(principal) = self
            .directories
            .for_role(client.role)
            .find_by_id(linked.refresh_token.principal_id)
            .await?
        else {
            warn!(
                principal_id = linked.refresh_token.principal_id,
                role = %client.role,
                "refresh token belongs to a removed principal"
            );
            return Err(AuthError::InvalidToken);
        };

        let (access_token, new_refresh_token) = self.mint_pair(&client, &principal, now)?;
        match self
            .store
            .rotate_token_pair(&linked, access_token, new_refresh_token)
            .await?
        {
            RotationOutcome::Rotated {
                access_token,
                refresh_token,
            } => {
                debug!(
                    principal_id = principal.id,
                    client_id = client.id,
                    "rotated token pair"
                );
                Ok(TokenPair::new(access_token, refresh_token))
            }
            RotationOutcome::Superseded => {
                debug!(
                    refresh_token_id = linked.refresh_token.id,
                    "refresh token consumed by a concurrent rotation"
                );
                Err(AuthError::InvalidToken)
            }
        }
    }

    /// Verify an access token and confirm it has not been rotated out.
    ///
    /// # Errors
    /// `TokenExpired` past its `exp`, `InvalidToken` for a bad signature or a
    /// token no longer in the store, `Internal` for store failures.
    #[instrument(skip(self, access_token))]
    pub async fn authenticate(&self, access_token: &str) -> Result<Claims, AuthError> {
        let claims = self.issuer.verify(access_token)?;

        let stored = self
            .store
            .find_access_token(access_token)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if stored.principal_id != claims.id {
            return Err(AuthError::Internal(anyhow!(
                "access token {} is stored for principal {} but claims {}",
                stored.id,
                stored.principal_id,
                claims.id
            )));
        }

        Ok(claims)
    }

    async fn dummy_hash(&self) -> Result<String, AuthError> {
        let cost = self.issuer.config().bcrypt_cost();
        let hash = self
            .dummy_hash
            .get_or_try_init(|| {
                hash_password_blocking(SecretString::from(ulid::Ulid::new().to_string()), cost)
            })
            .await?;
        Ok(hash.clone())
    }

    fn mint_pair(
        &self,
        client: &Client,
        principal: &Principal,
        now: DateTime<Utc>,
    ) -> Result<(NewAccessToken, NewRefreshToken), AuthError> {
        let access_token = self.issuer.mint_access_token(principal, client.role, now)?;
        let refresh_token = self.issuer.mint_refresh_token(now)?;

        Ok((
            NewAccessToken {
                client_id: client.id,
                principal_id: principal.id,
                token: access_token.token,
                scope: DEFAULT_SCOPE.to_string(),
                expires_at: access_token.expires_at,
            },
            NewRefreshToken {
                principal_id: principal.id,
                token: refresh_token.token,
                expires_at: refresh_token.expires_at,
            },
        ))
    }
}

impl fmt::Debug for AuthService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthService")
            .field("issuer", &self.issuer)
            .field("notifications", &self.notifications.is_some())
            .finish_non_exhaustive()
    }
}
