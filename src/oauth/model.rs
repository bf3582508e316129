//! Records owned by the credential store and the principal directories.

use anyhow::{anyhow, Error};
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

pub const TOKEN_TYPE: &str = "Bearer";
pub const DEFAULT_SCOPE: &str = "*";

/// Which principal directory a client authenticates against.
///
/// Assigned when the client is provisioned and never re-derived from a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientRole {
    Admin,
    User,
}

impl ClientRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }

    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl fmt::Display for ClientRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientRole {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "user" => Ok(Self::User),
            other => Err(anyhow!("unknown client role: {other}")),
        }
    }
}

/// A registered consumer application.
#[derive(Clone)]
pub struct Client {
    pub id: i64,
    pub name: String,
    pub client_key: String,
    pub client_secret: SecretString,
    pub role: ClientRole,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("client_key", &self.client_key)
            .field("client_secret", &"***")
            .field("role", &self.role)
            .finish()
    }
}

/// A user or an admin, as resolved by a principal directory.
#[derive(Clone)]
pub struct Principal {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub password_hash: String,
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("name", &self.name)
            .field("password_hash", &"***")
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessToken {
    pub id: i64,
    pub client_id: i64,
    pub principal_id: i64,
    pub token: String,
    pub scope: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshToken {
    pub id: i64,
    pub access_token_id: i64,
    pub principal_id: i64,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// A refresh token together with the access token it is bound to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkedRefreshToken {
    pub refresh_token: RefreshToken,
    pub access_token: AccessToken,
}

/// Access token row before the store assigns an id.
#[derive(Clone, Debug)]
pub struct NewAccessToken {
    pub client_id: i64,
    pub principal_id: i64,
    pub token: String,
    pub scope: String,
    pub expires_at: DateTime<Utc>,
}

/// Refresh token row before the store assigns an id and links it to its access token.
#[derive(Clone, Debug)]
pub struct NewRefreshToken {
    pub principal_id: i64,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// What login and refresh hand back to the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
    pub scope: String,
}

impl TokenPair {
    #[must_use]
    pub fn new(access_token: AccessToken, refresh_token: RefreshToken) -> Self {
        Self {
            access_token: access_token.token,
            refresh_token: refresh_token.token,
            token_type: TOKEN_TYPE,
            expires_at: access_token.expires_at,
            scope: access_token.scope,
        }
    }
}
