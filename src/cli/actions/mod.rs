pub mod hash_password;
pub mod openapi;
pub mod server;

// The match over `Action` lives in its own module so `mod.rs` stays small.
mod run;

#[derive(Debug)]
pub enum Action {
    Server(server::Args),
    HashPassword(hash_password::Args),
    OpenApi,
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}
