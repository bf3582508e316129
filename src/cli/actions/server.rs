use crate::{
    api,
    cli::{commands::vault::Options as VaultOptions, globals::GlobalArgs},
    notify::{spawn_notification_worker, LogNotificationSender, NotificationWorkerConfig},
    oauth::{
        postgres::{PgCredentialStore, PgPrincipalDirectory, PrincipalTable},
        AuthConfig, AuthService, Directories, TokenIssuer,
    },
    vault,
};
use anyhow::{anyhow, Context, Result};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tracing::{debug, info};
use url::Url;

pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub jwt_secret: Option<SecretString>,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
    pub notify_queue_size: usize,
    pub notify_max_attempts: u32,
    pub notify_backoff_base_seconds: u64,
    pub notify_backoff_max_seconds: u64,
    pub vault: Option<VaultOptions>,
}

impl std::fmt::Debug for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Args")
            .field("port", &self.port)
            .field("dsn", &redact_dsn(&self.dsn))
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "***"))
            .field("access_token_ttl_seconds", &self.access_token_ttl_seconds)
            .field("refresh_token_ttl_seconds", &self.refresh_token_ttl_seconds)
            .field("notify_queue_size", &self.notify_queue_size)
            .field("notify_max_attempts", &self.notify_max_attempts)
            .field("vault", &self.vault.as_ref().map(|v| v.url.as_str()))
            .finish_non_exhaustive()
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if Vault login fails, the database is unreachable, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    info!(
        port = args.port,
        dsn = %redact_dsn(&args.dsn),
        vault = args.vault.is_some(),
        "starting tessera"
    );

    // Fired by the Vault renewal tasks when a lease can no longer be renewed.
    let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();

    let (dsn, jwt_secret) = match &args.vault {
        Some(vault_opts) => {
            let globals = vault_session(vault_opts).await?;

            let dsn = inject_db_creds(&args.dsn, &globals)?;
            let jwt_secret =
                vault::kv::read_jwt_secret(&globals, &vault_opts.kv_mount, &vault_opts.kv_path)
                    .await
                    .context("Could not read the JWT signing secret")?;

            vault::renew::try_renew(&globals, shutdown_tx.clone()).await?;

            (dsn, jwt_secret)
        }
        None => {
            let jwt_secret = args
                .jwt_secret
                .clone()
                .ok_or_else(|| anyhow!("missing required argument: --jwt-secret"))?;
            (args.dsn.clone(), jwt_secret)
        }
    };

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(120))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let store = Arc::new(PgCredentialStore::new(pool.clone()));
    let directories = Directories::new(
        Arc::new(PgPrincipalDirectory::new(pool.clone(), PrincipalTable::Users)),
        Arc::new(PgPrincipalDirectory::new(pool, PrincipalTable::Admins)),
    );

    let config = AuthConfig::new()
        .with_access_token_ttl_seconds(args.access_token_ttl_seconds)
        .with_refresh_token_ttl_seconds(args.refresh_token_ttl_seconds);
    let issuer = TokenIssuer::new(&jwt_secret, config);

    let (notifications, _worker) = spawn_notification_worker(
        Arc::new(LogNotificationSender),
        NotificationWorkerConfig::new()
            .with_queue_size(args.notify_queue_size)
            .with_max_attempts(args.notify_max_attempts)
            .with_backoff_base_seconds(args.notify_backoff_base_seconds)
            .with_backoff_max_seconds(args.notify_backoff_max_seconds),
    );

    let auth = AuthService::new(store, directories, issuer).with_notifications(notifications);

    let result = api::new(args.port, Arc::new(auth), shutdown_rx).await;
    drop(shutdown_tx);
    result
}

/// Log in to Vault with AppRole and fetch dynamic database credentials.
async fn vault_session(opts: &VaultOptions) -> Result<GlobalArgs> {
    let mut globals = GlobalArgs::new(opts.url.clone());

    // If vault wrapped token try to unwrap, otherwise use secret-id.
    let secret_id = if let Some(wrapped) = &opts.wrapped_token {
        vault::unwrap(&globals.vault_url, wrapped).await?
    } else {
        opts.secret_id
            .clone()
            .ok_or_else(|| anyhow!("Vault secret-id is required"))?
    };

    let (token, _) = vault::approle_login(&globals.vault_url, &secret_id, &opts.role_id).await?;
    globals.set_token(token);

    vault::database::database_creds(&mut globals)
        .await
        .context("Could not get database username and password")?;

    debug!("Global args: {:?}", globals);

    Ok(globals)
}

fn inject_db_creds(dsn: &str, globals: &GlobalArgs) -> Result<String> {
    let mut dsn = Url::parse(dsn)?;

    dsn.set_username(&globals.vault_db_username)
        .map_err(|()| anyhow!("Error setting username"))?;

    dsn.set_password(Some(globals.vault_db_password.expose_secret()))
        .map_err(|()| anyhow!("Error setting password"))?;

    Ok(dsn.to_string())
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}
