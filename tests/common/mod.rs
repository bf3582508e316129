#![allow(dead_code)]

use anyhow::Result;
use secrecy::SecretString;
use std::sync::Arc;
use tessera::oauth::{
    memory::{MemoryCredentialStore, MemoryPrincipalDirectory},
    password::hash_password,
    AuthConfig, AuthService, Client, ClientRole, CredentialStore, Directories, LoginCommand,
    Principal, TokenIssuer,
};

pub const CLIENT_KEY: &str = "k";
pub const CLIENT_SECRET: &str = "s";
pub const ADMIN_EMAIL: &str = "a@x.com";
pub const ADMIN_PASSWORD: &str = "pw";
pub const ADMIN_ID: i64 = 7;
pub const CLIENT_ID: i64 = 2;
pub const JWT_SECRET: &str = "integration-secret";

pub struct Fixture {
    pub store: Arc<MemoryCredentialStore>,
    pub admins: Arc<MemoryPrincipalDirectory>,
    pub users: Arc<MemoryPrincipalDirectory>,
    pub service: Arc<AuthService>,
}

pub fn admin_client() -> Client {
    Client {
        id: CLIENT_ID,
        name: "web-admin".to_string(),
        client_key: CLIENT_KEY.to_string(),
        client_secret: SecretString::from(CLIENT_SECRET.to_string()),
        role: ClientRole::Admin,
    }
}

pub fn admin() -> Result<Principal> {
    Ok(Principal {
        id: ADMIN_ID,
        email: ADMIN_EMAIL.to_string(),
        name: "Ada".to_string(),
        // Minimum cost keeps the tests fast.
        password_hash: hash_password(ADMIN_PASSWORD, 4)?,
    })
}

pub fn issuer() -> TokenIssuer {
    TokenIssuer::new(
        &SecretString::from(JWT_SECRET.to_string()),
        AuthConfig::new().with_bcrypt_cost(4),
    )
}

/// One admin client (id 2) and one admin (id 7) over in-memory storage.
pub async fn fixture() -> Result<Fixture> {
    let store = Arc::new(MemoryCredentialStore::new());
    store.insert_client(admin_client()).await?;

    let admins = Arc::new(MemoryPrincipalDirectory::new());
    admins.upsert(admin()?).await?;
    let users = Arc::new(MemoryPrincipalDirectory::new());

    let service = Arc::new(service_with(store.clone(), &users, &admins));

    Ok(Fixture {
        store,
        admins,
        users,
        service,
    })
}

pub fn service_with(
    store: Arc<dyn CredentialStore>,
    users: &Arc<MemoryPrincipalDirectory>,
    admins: &Arc<MemoryPrincipalDirectory>,
) -> AuthService {
    AuthService::new(
        store,
        Directories::new(users.clone(), admins.clone()),
        issuer(),
    )
}

pub fn login_command(email: &str, password: &str) -> LoginCommand {
    LoginCommand {
        client_key: CLIENT_KEY.to_string(),
        client_secret: SecretString::from(CLIENT_SECRET.to_string()),
        email: email.to_string(),
        password: SecretString::from(password.to_string()),
    }
}
