//! Minimal Vault client: AppRole login, dynamic database credentials, KV v2
//! reads and token/lease renewal.
//!
//! `vault_url` is the AppRole login URL (`https://vault:8200/v1/auth/approle/login`);
//! every other endpoint is resolved against its scheme, host and port.

pub mod database;
pub mod kv;
pub mod renew;

use anyhow::{anyhow, Context, Result};
use reqwest::{Client, Response};
use secrecy::SecretString;
use serde_json::{json, Value};
use tracing::{debug, instrument};
use url::Url;

use crate::APP_USER_AGENT;

/// # Errors
/// Returns an error if the URL cannot be parsed or uses an unsupported scheme.
#[instrument]
pub fn endpoint_url(vault_url: &str, endpoint: &str) -> Result<String> {
    let url = Url::parse(vault_url)?;

    let scheme = url.scheme();

    let host = url
        .host()
        .ok_or_else(|| anyhow!("Error parsing URL: no host specified"))?
        .to_owned();

    let port = match url.port() {
        Some(p) => p,
        None => match scheme {
            "http" => 80,
            "https" => 443,
            _ => return Err(anyhow!("Error parsing URL: unsupported scheme {}", scheme)),
        },
    };

    let endpoint_url = format!("{scheme}://{host}:{port}{endpoint}");

    debug!("endpoint URL: {}", endpoint_url);

    Ok(endpoint_url)
}

pub(crate) fn client() -> Result<Client> {
    Client::builder()
        .user_agent(APP_USER_AGENT)
        .build()
        .context("failed to build vault http client")
}

/// Turn a non-2xx Vault response into an error carrying its first message.
pub(crate) async fn error_for_status(url: &str, response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let json_response: Value = response.json().await.unwrap_or_default();

    Err(anyhow!(
        "{} - {}, {}",
        url,
        status,
        json_response["errors"][0].as_str().unwrap_or("")
    ))
}

/// Unwrap a wrapped Vault client token
/// Create wrapped token with:
/// vault write -wrap-ttl=300s -f auth/approle/role/tessera/secret-id
///
/// # Errors
/// Returns an error if the request fails or the response has no `secret_id`.
#[instrument(skip(token))]
pub async fn unwrap(vault_url: &str, token: &str) -> Result<String> {
    let client = client()?;

    let unwrap_url = endpoint_url(vault_url, "/v1/sys/wrapping/unwrap")?;

    let response = client
        .post(&unwrap_url)
        .header("X-Vault-Token", token)
        .send()
        .await?;
    let response = error_for_status(&unwrap_url, response).await?;

    let json_response: Value = response.json().await?;
    let sid = json_response["data"]["secret_id"]
        .as_str()
        .ok_or_else(|| anyhow!("Error parsing JSON response: no secret_id found"))?;

    Ok(sid.to_string())
}

/// Login to Vault using AppRole
/// Create a secret ID with:
/// vault write -f auth/approle/role/tessera/secret-id
///
/// # Errors
/// Returns an error if the login is rejected or the response has no token.
#[instrument(skip(sid))]
pub async fn approle_login(vault_url: &str, sid: &str, rid: &str) -> Result<(SecretString, u64)> {
    let client = client()?;

    let login_payload = json!({
        "role_id": rid,
        "secret_id": sid
    });

    debug!("login URL: {}, role ID: {}", vault_url, rid);

    let response = client.post(vault_url).json(&login_payload).send().await?;
    let response = error_for_status(vault_url, response).await?;

    let json_response: Value = response.json().await?;
    let token = json_response["auth"]["client_token"]
        .as_str()
        .ok_or_else(|| anyhow!("Error parsing JSON response: no client_token found"))?;
    let lease_duration = json_response["auth"]["lease_duration"]
        .as_u64()
        .unwrap_or(1800);

    Ok((SecretString::from(token.to_string()), lease_duration))
}
