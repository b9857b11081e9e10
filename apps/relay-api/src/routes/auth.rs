use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use relay_common::packets::{message, Message};

use crate::auth::middleware::RawToken;
use crate::auth::password::hash_password;
use crate::error::ApiError;
use crate::routes::proto::{with_status, Protobuf};
use crate::AppState;

/// Longest accepted username, in characters.
pub const MAX_USERNAME_CHARS: usize = 20;
/// Shortest accepted password, in characters.
pub const MIN_PASSWORD_CHARS: usize = 12;

const LOGIN_FAILED: &str = "Incorrect username or password";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
}

// =========================================================================
// POST /register
// =========================================================================

async fn register(
    State(state): State<AppState>,
    Protobuf(body): Protobuf<Message>,
) -> Result<Response, ApiError> {
    let Some(message::Type::Register(req)) = body.r#type else {
        return Err(ApiError::bad_request("Message not supported"));
    };

    if let Err(reason) = validate_username(&req.username) {
        tracing::debug!(reason, "register denied");
        return Ok(Protobuf(Message::deny(format!("Invalid username: {reason}"))).into_response());
    }
    if let Err(reason) = validate_password(&req.password) {
        tracing::debug!(reason, "register denied");
        return Ok(Protobuf(Message::deny(format!("Invalid password: {reason}"))).into_response());
    }

    let hash = hash_password(&req.password)?;
    let account = match state.accounts.create_user(&req.username, &hash).await {
        Ok(account) => account,
        Err(err) if err.status == StatusCode::CONFLICT => {
            return Ok(Protobuf(Message::deny("User already exists")).into_response());
        }
        Err(err) => return Err(err),
    };

    tracing::info!(user_id = %account.id, username = %account.username, "user registered");
    Ok(with_status(StatusCode::CREATED, Message::ok()))
}

/// Usernames: 1 to 20 characters, no surrounding whitespace.
pub fn validate_username(username: &str) -> Result<(), &'static str> {
    let chars = username.chars().count();
    if chars == 0 {
        return Err("empty");
    }
    if chars > MAX_USERNAME_CHARS {
        return Err("too long");
    }
    if username != username.trim() {
        return Err("leading or trailing whitespace");
    }
    Ok(())
}

/// Passwords: at least 12 characters with a digit and an uppercase letter,
/// no surrounding whitespace.
pub fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err("length less than minimum");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("missing a number");
    }
    if password != password.trim() {
        return Err("leading or trailing whitespace");
    }
    if !password.chars().any(char::is_uppercase) {
        return Err("missing an uppercase letter");
    }
    Ok(())
}

// =========================================================================
// POST /login
// =========================================================================

async fn login(
    State(state): State<AppState>,
    Protobuf(body): Protobuf<Message>,
) -> Result<Protobuf<Message>, ApiError> {
    let Some(message::Type::Login(req)) = body.r#type else {
        return Err(ApiError::bad_request("Message not supported"));
    };

    let user_id = match state.auth.authenticate(&req.username, &req.password).await {
        Ok(user_id) => user_id,
        Err(err) if err.status == StatusCode::UNAUTHORIZED => {
            tracing::debug!(username = %req.username, "login denied");
            return Ok(Protobuf(Message::deny(LOGIN_FAILED)));
        }
        Err(err) => return Err(err),
    };

    let pair = state.auth.issue_pair(&user_id).await?;
    tracing::info!(%user_id, "user logged in");
    Ok(Protobuf(Message::jwt(pair.access_token, pair.refresh_token)))
}

// =========================================================================
// POST /refresh, POST /logout
// =========================================================================

async fn refresh(
    State(state): State<AppState>,
    RawToken(token): RawToken,
) -> Result<Protobuf<Message>, ApiError> {
    let pair = state.auth.refresh(&token).await?;
    Ok(Protobuf(Message::jwt(pair.access_token, pair.refresh_token)))
}

async fn logout(
    State(state): State<AppState>,
    RawToken(token): RawToken,
) -> Result<Protobuf<Message>, ApiError> {
    state.auth.logout(&token).await?;
    Ok(Protobuf(Message::ok()))
}
