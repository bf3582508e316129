use crate::{cli::globals::GlobalArgs, vault};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{info_span, instrument, Instrument};

pub const JWT_SECRET_FIELD: &str = "jwt_secret";

/// Read the access-token signing secret from a KV v2 secret.
///
/// # Errors
/// Returns an error if the Vault request fails or the field is missing or empty.
#[instrument(skip(globals))]
pub async fn read_jwt_secret(
    globals: &GlobalArgs,
    kv_mount: &str,
    kv_path: &str,
) -> Result<SecretString> {
    let client = vault::client()?;
    let path = format!("/v1/{kv_mount}/data/{kv_path}");
    let url = vault::endpoint_url(&globals.vault_url, &path)?;

    let span = info_span!(
        "vault.kv.read",
        http.method = "GET",
        url = %url
    );
    let response = client
        .get(&url)
        .header("X-Vault-Token", globals.vault_token.expose_secret())
        .send()
        .instrument(span)
        .await?;
    let response = vault::error_for_status(&url, response).await?;

    let json: Value = response.json().await?;
    let secret = json
        .get("data")
        .and_then(|data| data.get("data"))
        .and_then(|data| data.get(JWT_SECRET_FIELD))
        .and_then(Value::as_str)
        .filter(|secret| !secret.is_empty())
        .context("jwt secret missing from vault response")?;

    Ok(SecretString::from(secret.to_string()))
}
