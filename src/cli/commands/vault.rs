use clap::{Arg, ArgMatches, Command};

pub const ARG_VAULT_URL: &str = "vault-url";
pub const ARG_VAULT_ROLE_ID: &str = "vault-role-id";
pub const ARG_VAULT_SECRET_ID: &str = "vault-secret-id";
pub const ARG_VAULT_WRAPPED_TOKEN: &str = "vault-wrapped-token";
pub const ARG_VAULT_KV_MOUNT: &str = "vault-kv-mount";
pub const ARG_VAULT_KV_PATH: &str = "vault-kv-path";

/// Vault settings, present only when `--vault-url` is set.
#[derive(Debug)]
pub struct Options {
    pub url: String,
    pub role_id: String,
    pub secret_id: Option<String>,
    pub wrapped_token: Option<String>,
    pub kv_mount: String,
    pub kv_path: String,
}

impl Options {
    /// Parse Vault arguments from matches.
    ///
    /// # Errors
    /// Returns an error if `--vault-url` is set without the AppRole credentials.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Option<Self>> {
        // Helper to filter empty strings which clap might pass through if env vars are set to ""
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        let Some(url) = get_non_empty(ARG_VAULT_URL) else {
            return Ok(None);
        };

        let role_id = get_non_empty(ARG_VAULT_ROLE_ID)
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_VAULT_ROLE_ID}"))?;
        let secret_id = get_non_empty(ARG_VAULT_SECRET_ID);
        let wrapped_token = get_non_empty(ARG_VAULT_WRAPPED_TOKEN);
        if secret_id.is_none() && wrapped_token.is_none() {
            anyhow::bail!(
                "missing required argument: --{ARG_VAULT_SECRET_ID} or --{ARG_VAULT_WRAPPED_TOKEN}"
            );
        }

        Ok(Some(Self {
            url,
            role_id,
            secret_id,
            wrapped_token,
            kv_mount: get_non_empty(ARG_VAULT_KV_MOUNT)
                .unwrap_or_else(|| "secret/tessera".to_string()),
            kv_path: get_non_empty(ARG_VAULT_KV_PATH).unwrap_or_else(|| "config".to_string()),
        }))
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_VAULT_URL)
                .long(ARG_VAULT_URL)
                .help("Vault approle login URL, example: https://vault.tld:8200/v1/auth/<approle>/login")
                .env("TESSERA_VAULT_URL"),
        )
        .arg(
            Arg::new(ARG_VAULT_ROLE_ID)
                .long(ARG_VAULT_ROLE_ID)
                .help("Vault role id")
                .env("TESSERA_VAULT_ROLE_ID")
                .requires(ARG_VAULT_URL),
        )
        .arg(
            Arg::new(ARG_VAULT_SECRET_ID)
                .long(ARG_VAULT_SECRET_ID)
                .help("Vault secret id")
                .env("TESSERA_VAULT_SECRET_ID")
                .hide_env_values(true)
                .conflicts_with(ARG_VAULT_WRAPPED_TOKEN),
        )
        .arg(
            Arg::new(ARG_VAULT_WRAPPED_TOKEN)
                .long(ARG_VAULT_WRAPPED_TOKEN)
                .help("Vault wrapped token")
                .env("TESSERA_VAULT_WRAPPED_TOKEN")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_VAULT_KV_MOUNT)
                .long(ARG_VAULT_KV_MOUNT)
                .help("Vault KV-v2 mount path holding the signing secret")
                .env("TESSERA_VAULT_KV_MOUNT")
                .default_value("secret/tessera"),
        )
        .arg(
            Arg::new(ARG_VAULT_KV_PATH)
                .long(ARG_VAULT_KV_PATH)
                .help("Vault KV-v2 secret path holding the signing secret")
                .env("TESSERA_VAULT_KV_PATH")
                .default_value("config"),
        )
}
