//! Token endpoints: login, refresh and access-token introspection.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{error, instrument};

use super::{
    extract_bearer_token,
    types::{ClaimsResponse, ErrorResponse, LoginRequest, RefreshRequest, TokenResponse},
    valid_email,
};
use crate::oauth::{AuthError, AuthService, LoginCommand};

/// Shared by `InvalidClient` and `InvalidCredentials` so callers cannot tell them apart.
pub const INVALID_LOGIN_MESSAGE: &str = "username or password is invalid";
pub const REFRESH_EXPIRED_MESSAGE: &str = "refresh token expired";
pub const INVALID_REFRESH_MESSAGE: &str = "invalid refresh token";
pub const ACCESS_EXPIRED_MESSAGE: &str = "access token expired";
pub const INVALID_ACCESS_MESSAGE: &str = "invalid access token";
const INTERNAL_MESSAGE: &str = "internal server error";

/// Which token the caller presented, for wording the 401 messages.
#[derive(Clone, Copy, Debug)]
enum Presented {
    Credentials,
    RefreshToken,
    AccessToken,
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (status, Json(ErrorResponse::new(code, message))).into_response()
}

fn bad_request(message: &str) -> Response {
    error_response(StatusCode::BAD_REQUEST, "invalid_request", message)
}

fn auth_error_response(err: &AuthError, presented: Presented) -> Response {
    match (err, presented) {
        (AuthError::InvalidClient | AuthError::InvalidCredentials, _) => error_response(
            StatusCode::UNAUTHORIZED,
            "invalid_credentials",
            INVALID_LOGIN_MESSAGE,
        ),
        (AuthError::TokenExpired, Presented::AccessToken) => error_response(
            StatusCode::UNAUTHORIZED,
            "token_expired",
            ACCESS_EXPIRED_MESSAGE,
        ),
        (AuthError::TokenExpired, _) => error_response(
            StatusCode::UNAUTHORIZED,
            "token_expired",
            REFRESH_EXPIRED_MESSAGE,
        ),
        (AuthError::InvalidToken, Presented::AccessToken) => error_response(
            StatusCode::UNAUTHORIZED,
            "invalid_token",
            INVALID_ACCESS_MESSAGE,
        ),
        (AuthError::InvalidToken, _) => error_response(
            StatusCode::UNAUTHORIZED,
            "invalid_token",
            INVALID_REFRESH_MESSAGE,
        ),
        (AuthError::Internal(cause), _) => {
            error!("token request failed: {cause:#}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                INTERNAL_MESSAGE,
            )
        }
    }
}

#[utoipa::path(
    post,
    path= "/api/v1/oauths",
    request_body = LoginRequest,
    responses (
        (status = 200, description = "Token pair issued", body = TokenResponse, content_type = "application/json"),
        (status = 400, description = "Missing or malformed payload", body = ErrorResponse),
        (status = 401, description = "Unknown client or wrong email/password", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse),
    ),
    tag= "oauth"
)]
#[instrument(skip(auth, payload))]
pub async fn login(
    auth: Extension<Arc<AuthService>>,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return bad_request("Missing payload"),
    };

    if request.client_id.is_empty() || request.client_secret.is_empty() {
        return bad_request("client_id and client_secret are required");
    }
    let email = request.email.trim().to_string();
    if !valid_email(&email) {
        return bad_request("invalid email");
    }
    if request.password.is_empty() {
        return bad_request("password is required");
    }

    let command = LoginCommand {
        client_key: request.client_id,
        client_secret: SecretString::from(request.client_secret),
        email,
        password: SecretString::from(request.password),
    };

    match auth.login(command).await {
        Ok(pair) => (StatusCode::OK, Json(TokenResponse::from(pair))).into_response(),
        Err(err) => auth_error_response(&err, Presented::Credentials),
    }
}

#[utoipa::path(
    post,
    path= "/api/v1/oauths/refresh",
    request_body = RefreshRequest,
    responses (
        (status = 200, description = "Token pair rotated", body = TokenResponse, content_type = "application/json"),
        (status = 400, description = "Missing or malformed payload", body = ErrorResponse),
        (status = 401, description = "Refresh token unknown, already rotated or expired", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse),
    ),
    tag= "oauth"
)]
#[instrument(skip(auth, payload))]
pub async fn refresh(
    auth: Extension<Arc<AuthService>>,
    payload: Option<Json<RefreshRequest>>,
) -> Response {
    let request: RefreshRequest = match payload {
        Some(Json(payload)) => payload,
        None => return bad_request("Missing payload"),
    };

    let refresh_token = request.refresh_token.trim();
    if refresh_token.is_empty() {
        return bad_request("refresh_token is required");
    }

    match auth.refresh(refresh_token).await {
        Ok(pair) => (StatusCode::OK, Json(TokenResponse::from(pair))).into_response(),
        Err(err) => auth_error_response(&err, Presented::RefreshToken),
    }
}

#[utoipa::path(
    get,
    path= "/api/v1/oauths/me",
    responses (
        (status = 200, description = "Access token is valid", body = ClaimsResponse, content_type = "application/json"),
        (status = 401, description = "Missing, invalid, rotated or expired access token", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag= "oauth"
)]
#[instrument(skip(auth, headers))]
pub async fn me(auth: Extension<Arc<AuthService>>, headers: HeaderMap) -> Response {
    let Some(token) = extract_bearer_token(&headers) else {
        return error_response(
            StatusCode::UNAUTHORIZED,
            "invalid_token",
            INVALID_ACCESS_MESSAGE,
        );
    };

    match auth.authenticate(&token).await {
        Ok(claims) => (StatusCode::OK, Json(ClaimsResponse::from(claims))).into_response(),
        Err(err) => auth_error_response(&err, Presented::AccessToken),
    }
}
