use crate::oauth::{password::hash_password_blocking, AuthConfig};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::io::{BufRead, Write};

#[derive(Debug)]
pub struct Args {
    pub cost: u32,
}

/// Read one password line from stdin and print its bcrypt hash, ready to be
/// stored in the `users` or `admins` table.
/// # Errors
/// Returns an error if stdin is empty or hashing fails.
pub async fn execute(args: Args) -> Result<()> {
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read password from stdin")?;
    let password = read_password(&line)?;

    let config = hashing_config(&args);
    let hash = hash_password_blocking(SecretString::from(password), config.bcrypt_cost()).await?;

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{hash}")?;
    Ok(())
}

fn hashing_config(args: &Args) -> AuthConfig {
    AuthConfig::new().with_bcrypt_cost(args.cost).normalize()
}

fn read_password(line: &str) -> Result<String> {
    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        anyhow::bail!("empty password");
    }
    Ok(password.to_string())
}
