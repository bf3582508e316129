use crate::{cli::globals::GlobalArgs, vault};
use anyhow::{anyhow, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tokio::{
    sync::mpsc,
    time::{sleep, Duration},
};
use tracing::{debug, error, instrument, warn};

const RENEW_ATTEMPTS: u32 = 3;

/// Renew a Vault token
#[instrument(skip(token))]
async fn renew_token(url: &str, token: &SecretString, increment: Option<u64>) -> Result<u64> {
    let client = vault::client()?;

    let renew_url = vault::endpoint_url(url, "/v1/auth/token/renew-self")?;

    let payload = json!({
        "increment": increment.unwrap_or(0)
    });

    let response = client
        .post(&renew_url)
        .json(&payload)
        .header("X-Vault-Token", token.expose_secret())
        .send()
        .await?;
    let response = vault::error_for_status(&renew_url, response).await?;

    let json_response: Value = response.json().await?;

    json_response["auth"]["lease_duration"]
        .as_u64()
        .ok_or_else(|| anyhow!("Error parsing JSON response: no lease_duration found"))
}

/// Renew the dynamic database credentials lease
#[instrument(skip(token))]
async fn renew_db_lease(
    url: &str,
    token: &SecretString,
    lease_id: &str,
    increment: u64,
) -> Result<u64> {
    let client = vault::client()?;

    let renew_url = vault::endpoint_url(url, "/v1/sys/leases/renew")?;

    let payload = json!({
        "lease_id": lease_id,
        "increment": increment
    });

    let response = client
        .put(&renew_url)
        .json(&payload)
        .header("X-Vault-Token", token.expose_secret())
        .send()
        .await?;
    let response = vault::error_for_status(&renew_url, response).await?;

    let json_response: Value = response.json().await?;

    json_response["lease_duration"]
        .as_u64()
        .ok_or_else(|| anyhow!("Error parsing JSON response: no lease_duration found"))
}

/// Renew at 70-90% of the lease so renewals from several replicas spread out.
fn jittered(rng: &mut StdRng, lease_duration: u64) -> Duration {
    let factor = rng.gen_range(70..90);
    Duration::from_secs(lease_duration * factor / 100)
}

/// Keep the Vault token and the database lease alive in the background.
/// Sends on `tx` once either renewal fails three times in a row, which shuts
/// the server down.
///
/// # Errors
/// Returns an error if the renewal tasks cannot be set up.
#[instrument(skip(globals, tx))]
pub async fn try_renew(globals: &GlobalArgs, tx: mpsc::UnboundedSender<()>) -> Result<()> {
    // renew the token
    tokio::spawn({
        let mut rng = StdRng::from_entropy();
        let mut jittered_lease_duration = Duration::default();

        let url = globals.vault_url.clone();
        let token = globals.vault_token.clone();
        let tx = tx.clone();

        async move {
            loop {
                for attempt in 1..=RENEW_ATTEMPTS {
                    let backoff_time = 2u64.pow(attempt - 1);

                    if attempt > 1 {
                        warn!("Backing off for {} seconds", backoff_time);
                        sleep(Duration::from_secs(backoff_time)).await;
                    }

                    match renew_token(&url, &token, None).await {
                        Ok(lease_duration) => {
                            jittered_lease_duration = jittered(&mut rng, lease_duration);
                            break;
                        }

                        Err(e) => {
                            error!("Failed to renew token: {}", e);

                            if attempt == RENEW_ATTEMPTS {
                                error!("Failed to renew token after {RENEW_ATTEMPTS} attempts");
                                let _ = tx.send(());
                                return;
                            }
                        }
                    }
                }

                debug!(
                    "Will renew token in {} seconds",
                    jittered_lease_duration.as_secs()
                );

                sleep(jittered_lease_duration).await;
            }
        }
    });

    // renew the DB lease_id
    tokio::spawn({
        let mut rng = StdRng::from_entropy();
        let mut jittered_lease_duration = Duration::default();

        let url = globals.vault_url.clone();
        let token = globals.vault_token.clone();
        let db_lease_id = globals.vault_db_lease_id.clone();
        let db_lease_duration = globals.vault_db_lease_duration;

        async move {
            loop {
                for attempt in 1..=RENEW_ATTEMPTS {
                    let backoff_time = 2u64.pow(attempt - 1);

                    if attempt > 1 {
                        warn!("Backing off for {} seconds", backoff_time);
                        sleep(Duration::from_secs(backoff_time)).await;
                    }

                    match renew_db_lease(&url, &token, &db_lease_id, db_lease_duration).await {
                        Ok(lease_duration) => {
                            jittered_lease_duration = jittered(&mut rng, lease_duration);
                            break;
                        }

                        Err(e) => {
                            error!("Failed to renew DB lease: {}", e);

                            if attempt == RENEW_ATTEMPTS {
                                error!("Failed to renew DB lease after {RENEW_ATTEMPTS} attempts");
                                let _ = tx.send(());
                                return;
                            }
                        }
                    }
                }

                debug!(
                    "Will renew DB lease in {} seconds",
                    jittered_lease_duration.as_secs()
                );

                sleep(jittered_lease_duration).await;
            }
        }
    });

    Ok(())
}
