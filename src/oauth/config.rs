//! Token lifetime and password hashing configuration.

use chrono::Duration;

/// One year.
pub const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 365 * 24 * 60 * 60;
/// One year plus one day, so a refresh token always outlives its access token.
pub const DEFAULT_REFRESH_TOKEN_TTL_SECONDS: i64 = 366 * 24 * 60 * 60;
pub const DEFAULT_BCRYPT_COST: u32 = 12;

#[derive(Clone, Copy, Debug)]
pub struct AuthConfig {
    access_token_ttl_seconds: i64,
    refresh_token_ttl_seconds: i64,
    bcrypt_cost: u32,
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            access_token_ttl_seconds: DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
            refresh_token_ttl_seconds: DEFAULT_REFRESH_TOKEN_TTL_SECONDS,
            bcrypt_cost: DEFAULT_BCRYPT_COST,
        }
    }

    #[must_use]
    pub fn with_access_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    /// Clamp non-positive lifetimes to one second and the bcrypt cost to the
    /// range the algorithm accepts.
    #[must_use]
    pub fn normalize(self) -> Self {
        Self {
            access_token_ttl_seconds: self.access_token_ttl_seconds.max(1),
            refresh_token_ttl_seconds: self.refresh_token_ttl_seconds.max(1),
            bcrypt_cost: self.bcrypt_cost.clamp(4, 31),
        }
    }

    #[must_use]
    pub fn access_token_ttl(&self) -> Duration {
        Duration::seconds(self.access_token_ttl_seconds)
    }

    #[must_use]
    pub fn refresh_token_ttl(&self) -> Duration {
        Duration::seconds(self.refresh_token_ttl_seconds)
    }

    #[must_use]
    pub fn bcrypt_cost(&self) -> u32 {
        self.bcrypt_cost
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}
