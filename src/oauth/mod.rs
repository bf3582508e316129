//! Token issuance and refresh-token rotation.
//!
//! A registered [`Client`] exchanges a principal's email and password for a
//! signed access token plus an opaque refresh token ([`AuthService::login`]),
//! and later trades the refresh token for a brand-new pair
//! ([`AuthService::refresh`]). The client's [`ClientRole`] decides which
//! principal directory (users or admins) is consulted and whether the access
//! token claims `isAdmin`.
//!
//! Storage sits behind [`CredentialStore`] and [`PrincipalDirectory`], with
//! Postgres and in-memory implementations.

pub mod config;
pub mod error;
pub mod memory;
pub mod model;
pub mod password;
pub mod postgres;
pub mod principal;
pub mod service;
pub mod store;
pub mod token;

pub use config::AuthConfig;
pub use error::AuthError;
pub use model::{Client, ClientRole, Principal, TokenPair};
pub use principal::{Directories, PrincipalDirectory};
pub use service::{AuthService, LoginCommand};
pub use store::{CredentialStore, RotationOutcome};
pub use token::{Claims, TokenIssuer};
