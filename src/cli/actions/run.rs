use super::{hash_password, openapi, server, Action};
use anyhow::Result;

pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Server(args) => server::execute(args).await,
        Action::HashPassword(args) => hash_password::execute(args).await,
        Action::OpenApi => openapi::execute(),
    }
}
