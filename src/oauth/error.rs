use thiserror::Error;

/// Failure kinds of the login, refresh and authenticate operations.
///
/// `InvalidClient` and `InvalidCredentials` are distinct internally but callers
/// should report them with the same message.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unknown client key/secret pair")]
    InvalidClient,
    #[error("unknown principal or wrong password")]
    InvalidCredentials,
    #[error("token expired")]
    TokenExpired,
    #[error("invalid token")]
    InvalidToken,
    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}
