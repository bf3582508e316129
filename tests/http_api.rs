mod common;

use anyhow::{ensure, Context, Result};
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tessera::api::{
    handlers::{
        oauth::{INVALID_ACCESS_MESSAGE, INVALID_LOGIN_MESSAGE, INVALID_REFRESH_MESSAGE},
        types::{ErrorResponse, TokenResponse},
    },
    router,
};
use tower::ServiceExt;

use common::{fixture, ADMIN_EMAIL, ADMIN_ID, ADMIN_PASSWORD, CLIENT_KEY, CLIENT_SECRET};

async fn app() -> Result<Router> {
    Ok(router(fixture().await?.service))
}

async fn send(app: &Router, request: Request<Body>) -> Result<(StatusCode, Value)> {
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).context("response is not JSON")?
    };
    Ok((status, body))
}

fn post_json(uri: &str, body: &Value) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body)?))?)
}

fn login_body(password: &str) -> Value {
    json!({
        "email": ADMIN_EMAIL,
        "password": password,
        "client_id": CLIENT_KEY,
        "client_secret": CLIENT_SECRET,
    })
}

async fn login(app: &Router) -> Result<TokenResponse> {
    let (status, body) = send(app, post_json("/api/v1/oauths", &login_body(ADMIN_PASSWORD))?).await?;
    ensure!(status == StatusCode::OK, "login failed: {body}");
    Ok(serde_json::from_value(body)?)
}

#[tokio::test]
async fn login_returns_token_pair() -> Result<()> {
    let app = app().await?;
    let tokens = login(&app).await?;

    ensure!(tokens.token_type == "Bearer");
    ensure!(tokens.scope == "*");
    ensure!(tokens.refresh_token.len() == 128);
    ensure!(tokens.expired_at.ends_with('Z'));
    Ok(())
}

#[tokio::test]
async fn login_rejects_bad_credentials_with_one_message() -> Result<()> {
    let app = app().await?;

    let (status, body) = send(&app, post_json("/api/v1/oauths", &login_body("wrong"))?).await?;
    ensure!(status == StatusCode::UNAUTHORIZED);
    let error: ErrorResponse = serde_json::from_value(body)?;
    ensure!(error.message == INVALID_LOGIN_MESSAGE);

    let mut unknown_client = login_body(ADMIN_PASSWORD);
    unknown_client["client_secret"] = json!("nope");
    let (status, body) = send(&app, post_json("/api/v1/oauths", &unknown_client)?).await?;
    ensure!(status == StatusCode::UNAUTHORIZED);
    let error: ErrorResponse = serde_json::from_value(body)?;
    ensure!(error.message == INVALID_LOGIN_MESSAGE);
    Ok(())
}

#[tokio::test]
async fn login_validates_payload() -> Result<()> {
    let app = app().await?;

    let mut bad_email = login_body(ADMIN_PASSWORD);
    bad_email["email"] = json!("not-an-email");
    let (status, _) = send(&app, post_json("/api/v1/oauths", &bad_email)?).await?;
    ensure!(status == StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/oauths")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))?;
    let (status, body) = send(&app, request).await?;
    ensure!(status == StatusCode::BAD_REQUEST);
    ensure!(body["code"] == "invalid_request");
    Ok(())
}

#[tokio::test]
async fn refresh_rotates_once() -> Result<()> {
    let app = app().await?;
    let tokens = login(&app).await?;
    let body = json!({ "refresh_token": tokens.refresh_token });

    let (status, rotated) = send(&app, post_json("/api/v1/oauths/refresh", &body)?).await?;
    ensure!(status == StatusCode::OK);
    let rotated: TokenResponse = serde_json::from_value(rotated)?;
    ensure!(rotated.refresh_token != tokens.refresh_token);

    let (status, replay) = send(&app, post_json("/api/v1/oauths/refresh", &body)?).await?;
    ensure!(status == StatusCode::UNAUTHORIZED);
    ensure!(replay["message"] == INVALID_REFRESH_MESSAGE);
    Ok(())
}

#[tokio::test]
async fn me_requires_live_access_token() -> Result<()> {
    let app = app().await?;
    let tokens = login(&app).await?;

    let request = Request::builder()
        .uri("/api/v1/oauths/me")
        .header(header::AUTHORIZATION, format!("Bearer {}", tokens.access_token))
        .body(Body::empty())?;
    let (status, claims) = send(&app, request).await?;
    ensure!(status == StatusCode::OK);
    ensure!(claims["id"] == ADMIN_ID);
    ensure!(claims["isAdmin"] == true);

    let request = Request::builder()
        .uri("/api/v1/oauths/me")
        .body(Body::empty())?;
    let (status, body) = send(&app, request).await?;
    ensure!(status == StatusCode::UNAUTHORIZED);
    ensure!(body["message"] == INVALID_ACCESS_MESSAGE);
    Ok(())
}

#[tokio::test]
async fn health_reports_database() -> Result<()> {
    let app = app().await?;

    let request = Request::builder().uri("/health").body(Body::empty())?;
    let response = app.clone().oneshot(request).await?;
    ensure!(response.status() == StatusCode::OK);
    ensure!(response.headers().contains_key("x-app"));
    ensure!(response.headers().contains_key("x-request-id"));

    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let body: Value = serde_json::from_slice(&bytes)?;
    ensure!(body["database"] == "ok");
    ensure!(body["name"] == env!("CARGO_PKG_NAME"));
    Ok(())
}
