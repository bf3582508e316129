use crate::{cli::globals::GlobalArgs, vault};
use anyhow::{anyhow, Result};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::instrument;

pub const DATABASE_CREDS_PATH: &str = "/v1/database/creds/tessera";

/// Get DB credentials from Vault
///
/// # Errors
/// Returns an error if the request fails or the response misses a field.
#[instrument(skip(globals))]
pub async fn database_creds(globals: &mut GlobalArgs) -> Result<()> {
    let client = vault::client()?;

    let db_creds = vault::endpoint_url(&globals.vault_url, DATABASE_CREDS_PATH)?;

    let response = client
        .get(db_creds.as_str())
        .header("X-Vault-Token", globals.vault_token.expose_secret())
        .send()
        .await?;
    let response = vault::error_for_status(&db_creds, response).await?;

    let json_response: Value = response.json().await?;

    let lease_id = json_response["lease_id"]
        .as_str()
        .ok_or_else(|| anyhow!("Error parsing JSON response: no lease_id found"))?;
    globals.vault_db_lease_id = lease_id.to_string();

    let lease_duration = json_response["lease_duration"]
        .as_u64()
        .ok_or_else(|| anyhow!("Error parsing JSON response: no lease_duration found"))?;
    globals.vault_db_lease_duration = lease_duration;

    let username = json_response["data"]["username"]
        .as_str()
        .ok_or_else(|| anyhow!("Error parsing JSON response: no username found"))?;
    globals.vault_db_username = username.to_string();

    let password = json_response["data"]["password"]
        .as_str()
        .ok_or_else(|| anyhow!("Error parsing JSON response: no password found"))?;
    globals.vault_db_password = SecretString::from(password.to_string());

    Ok(())
}
