//! Access token minting (HS256 JWT) and opaque refresh token generation.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

use super::{
    config::AuthConfig,
    error::AuthError,
    model::{ClientRole, Principal},
};

/// 96 random bytes encode to exactly 128 base64url characters.
const REFRESH_TOKEN_BYTES: usize = 96;

/// Payload of a signed access token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(rename = "isAdmin")]
    pub is_admin: bool,
    pub iat: i64,
    pub exp: i64,
    /// Unique per token, so two tokens minted in the same second never collide.
    pub jti: String,
}

#[derive(Clone, Debug)]
pub struct MintedAccessToken {
    pub token: String,
    pub claims: Claims,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct MintedRefreshToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    config: AuthConfig,
}

impl TokenIssuer {
    /// Build an issuer over the process-wide signing secret.
    #[must_use]
    pub fn new(secret: &SecretString, config: AuthConfig) -> Self {
        let secret = secret.expose_secret().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            config: config.normalize(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Sign fresh claims for `principal`. Expiry is truncated to whole seconds so
    /// the stored row and the `exp` claim agree.
    ///
    /// # Errors
    /// Returns an error if the expiry overflows or the claims cannot be signed.
    pub fn mint_access_token(
        &self,
        principal: &Principal,
        role: ClientRole,
        now: DateTime<Utc>,
    ) -> Result<MintedAccessToken> {
        let expires_at = truncate_to_seconds(now + self.config.access_token_ttl())?;
        let claims = Claims {
            id: principal.id,
            name: principal.name.clone(),
            email: principal.email.clone(),
            is_admin: role.is_admin(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Ulid::new().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("failed to sign access token")?;

        Ok(MintedAccessToken {
            token,
            claims,
            expires_at,
        })
    }

    /// Generate an opaque refresh token. It carries no claims and is only
    /// meaningful as a lookup key in the credential store.
    ///
    /// # Errors
    /// Returns an error if the OS random source fails or the expiry overflows.
    pub fn mint_refresh_token(&self, now: DateTime<Utc>) -> Result<MintedRefreshToken> {
        let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .context("failed to generate refresh token")?;

        Ok(MintedRefreshToken {
            token: Base64UrlUnpadded::encode_string(&bytes),
            expires_at: truncate_to_seconds(now + self.config.refresh_token_ttl())?,
        })
    }

    /// Check the signature and expiry of an access token and return its claims.
    ///
    /// # Errors
    /// `TokenExpired` when `exp` has passed, `InvalidToken` for anything else.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            })
    }
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("signing_key", &"***")
            .field("config", &self.config)
            .finish()
    }
}

fn truncate_to_seconds(value: DateTime<Utc>) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(value.timestamp(), 0).context("token expiry out of range")
}
