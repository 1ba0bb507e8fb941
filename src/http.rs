//! Thin HTTP routing layer around the token service.
//!
//! Endpoint wiring only; all token and key logic lives in
//! [`crate::tokens`] and [`crate::keyring`].

use crate::error::AuthError;
use crate::tokens::{TokenService, Verification};
use crate::users::{hash_password, password_matches, Principal, UserStore};
use axum::extract::{Form, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;
use uuid::Uuid;

/// Name of the refresh-token cookie.
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Shared state for the HTTP handlers.
pub struct AppState {
    /// Token issuance and verification
    pub tokens: Arc<TokenService>,
    /// User lookup collaborator
    pub users: Arc<dyn UserStore>,
    /// bcrypt cost for registration
    pub bcrypt_cost: u32,
}

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/authenticate", post(authenticate))
        .route("/refresh", get(refresh))
        .route("/keys", get(keys))
        .route("/register", post(register))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Deserialize)]
struct Credentials {
    email: String,
    password: String,
}

async fn authenticate(
    State(state): State<Arc<AppState>>,
    Form(creds): Form<Credentials>,
) -> Result<Response, AppError> {
    let user = state
        .users
        .find_by_email(&creds.email)
        .await?
        .filter(|user| password_matches(&creds.password, user));

    let Some(user) = user else {
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    };

    let refresh_token = state.tokens.issue_refresh_token(&user).await?;
    let access_token = state.tokens.issue_access_token(&user).await?;

    // Http-only, refresh-path-scoped: the refresh token never reaches
    // client-side script and is only sent back to /refresh.
    let cookie = format!("{REFRESH_COOKIE}={refresh_token}; Path=/refresh; HttpOnly");
    Ok(([(header::SET_COOKIE, cookie)], access_token).into_response())
}

async fn refresh(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let Some(token) = cookie_value(&headers, REFRESH_COOKIE) else {
        return Ok((StatusCode::BAD_REQUEST, "Missing refresh token cookie").into_response());
    };

    match state.tokens.verify_refresh_token(&token).await? {
        Verification::Valid { subject } => {
            let Ok(id) = Uuid::parse_str(&subject) else {
                return Ok((StatusCode::BAD_REQUEST, "Malformed subject").into_response());
            };
            match state.users.find_by_id(id).await? {
                Some(user) => Ok(state.tokens.issue_access_token(&user).await?.into_response()),
                None => Ok((
                    StatusCode::NOT_FOUND,
                    format!("User {subject} doesn't exist"),
                )
                    .into_response()),
            }
        }
        Verification::Invalid(reason) => Ok((
            StatusCode::BAD_REQUEST,
            format!("Invalid JWT Refresh token: {reason}"),
        )
            .into_response()),
    }
}

async fn keys(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let body = state.tokens.access_jwks_json().await?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

async fn register(
    State(state): State<Arc<AppState>>,
    Form(creds): Form<Credentials>,
) -> Result<Response, AppError> {
    if creds.email.is_empty() || creds.password.is_empty() {
        return Ok((StatusCode::BAD_REQUEST, "Missing email or password").into_response());
    }

    let hash = hash_password(&creds.password, state.bcrypt_cost)?;
    state.users.save(Principal::new(creds.email, hash)).await?;
    Ok(StatusCode::CREATED.into_response())
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(header::COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .find_map(|part| {
            let (key, value) = part.trim().split_once('=')?;
            (key == name).then(|| value.to_string())
        })
}

/// Fatal errors crossing the handler boundary: logged, opaque to clients.
struct AppError(AuthError);

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_parsing_handles_multiple_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            "session=abc; refreshToken=tok.en.sig; theme=dark".parse().unwrap(),
        );

        assert_eq!(
            cookie_value(&headers, REFRESH_COOKIE),
            Some("tok.en.sig".to_string())
        );
        assert_eq!(cookie_value(&headers, "session"), Some("abc".to_string()));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn cookie_parsing_without_header() {
        let headers = HeaderMap::new();
        assert_eq!(cookie_value(&headers, REFRESH_COOKIE), None);
    }
}
