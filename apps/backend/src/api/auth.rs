//! Authentication API endpoints.

use axum::{extract::State, http::StatusCode, Extension, Json};
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};

use crate::db::models::UserRole;
use crate::error::{AppError, Result};
use crate::services::Claims;
use crate::AppState;

use super::MessageResponse;

/// Minimum accepted password length at registration.
const MIN_PASSWORD_LEN: usize = 8;

/// Login and registration request body.
#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

/// Response carrying a JWT token.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub user: UserInfo,
}

/// User information returned in responses (without password hash).
#[derive(Debug, Clone, Serialize)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub role: UserRole,
}

/// POST /api/auth/login
///
/// Authenticates a user and returns a JWT token.
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> Result<Json<TokenResponse>> {
    if body.username.is_empty() || body.password.is_empty() {
        return Err(AppError::BadRequest(
            "Username and password are required".to_string(),
        ));
    }

    let db = state.db.lock().await;
    let auth_service = state.auth_service();

    let user = db
        .query_row(
            "SELECT id, username, password_hash, role FROM users WHERE username = ?1",
            [&body.username],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    UserRole::from_db(&row.get::<_, String>(3)?),
                ))
            },
        )
        .optional()?;

    let authenticated =
        auth_service.check_credentials(&body.password, user.as_ref().map(|u| u.2.as_str()))?;

    let (user_id, username, _, role) = match user {
        Some(user) if authenticated => user,
        _ => {
            tracing::debug!(username = %body.username, "Rejected login attempt");
            return Err(AppError::Unauthorized);
        }
    };

    let token = auth_service.create_token(user_id, role)?;

    tracing::info!(user_id, username = %username, "User logged in");

    Ok(Json(TokenResponse {
        token,
        user: UserInfo {
            id: user_id,
            username,
            role,
        },
    }))
}

/// POST /api/auth/register
///
/// Creates a regular user account and returns a token for it.
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<TokenResponse>)> {
    let username = body.username.trim();
    if username.is_empty() {
        return Err(AppError::BadRequest("Username is required".to_string()));
    }
    if body.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let auth_service = state.auth_service();
    let password_hash = auth_service.hash_password(&body.password)?;

    let db = state.db.lock().await;
    let inserted = db.execute(
        "INSERT INTO users (username, password_hash, role) VALUES (?1, ?2, 'user')
         ON CONFLICT(username) DO NOTHING",
        rusqlite::params![username, password_hash],
    )?;
    if inserted == 0 {
        return Err(AppError::BadRequest("Username already exists".to_string()));
    }
    let user_id = db.last_insert_rowid();

    let token = auth_service.create_token(user_id, UserRole::User)?;

    tracing::info!(user_id, username = %username, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(TokenResponse {
            token,
            user: UserInfo {
                id: user_id,
                username: username.to_string(),
                role: UserRole::User,
            },
        }),
    ))
}

/// POST /api/auth/logout
///
/// Tokens are stateless, so this only acknowledges; the client discards the token.
pub async fn logout(Extension(claims): Extension<Claims>) -> Result<Json<MessageResponse>> {
    tracing::info!(user_id = claims.sub, "User logged out");

    Ok(Json(MessageResponse::new("Logged out successfully")))
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UserInfo>> {
    let db = state.db.lock().await;

    let user = db
        .query_row(
            "SELECT id, username, role FROM users WHERE id = ?1",
            [claims.sub],
            |row| {
                Ok(UserInfo {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    role: UserRole::from_db(&row.get::<_, String>(2)?),
                })
            },
        )
        .optional()?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}
