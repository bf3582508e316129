use anyhow::Result;
use std::io::Write;

/// Print the OpenAPI document to stdout.
/// # Errors
/// Returns an error if serialization or writing to stdout fails.
pub fn execute() -> Result<()> {
    let json = crate::api::openapi::openapi().to_pretty_json()?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{json}")?;
    Ok(())
}
