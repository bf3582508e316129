pub mod logging;
pub mod notify;
pub mod token;
pub mod vault;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

use self::vault::{ARG_VAULT_ROLE_ID, ARG_VAULT_SECRET_ID, ARG_VAULT_URL, ARG_VAULT_WRAPPED_TOKEN};

pub const CMD_HASH_PASSWORD: &str = "hash-password";
pub const CMD_OPENAPI: &str = "openapi";

/// Validate that AppRole credentials accompany `--vault-url`.
///
/// # Errors
/// Returns an error string if `vault-url` is set but auth arguments are missing.
pub fn validate(matches: &clap::ArgMatches) -> Result<(), String> {
    let Some(url) = matches
        .get_one::<String>(ARG_VAULT_URL)
        .filter(|v| !v.trim().is_empty())
    else {
        return Ok(());
    };

    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(format!("--{ARG_VAULT_URL} must be an http(s) URL"));
    }
    if !matches.contains_id(ARG_VAULT_ROLE_ID) {
        return Err(format!("Missing required argument: --{ARG_VAULT_ROLE_ID}"));
    }
    if !matches.contains_id(ARG_VAULT_SECRET_ID) && !matches.contains_id(ARG_VAULT_WRAPPED_TOKEN) {
        return Err(format!(
            "Missing required argument: --{ARG_VAULT_SECRET_ID} or --{ARG_VAULT_WRAPPED_TOKEN}"
        ));
    }
    Ok(())
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("tessera")
        .about("OAuth token issuance and refresh-token rotation")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_negates_reqs(true)
        .subcommand(token::hash_password_command())
        .subcommand(Command::new(CMD_OPENAPI).about("Print the OpenAPI document as JSON"))
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("TESSERA_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("dsn")
                .short('d')
                .long("dsn")
                .help("Database connection string")
                .long_help(
                    "Database connection string. When --vault-url is set, username/password are injected from Vault DB creds.",
                )
                .env("TESSERA_DSN")
                .hide_env_values(true)
                .required(true),
        );

    let command = token::with_args(command);
    let command = notify::with_args(command);
    let command = vault::with_args(command);
    logging::with_args(command)
}
