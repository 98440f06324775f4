//! Login, logout, and session introspection.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_sessions::Session;
use tracing::instrument;

use crate::db::UserRepository;
use crate::error::AppError;
use crate::middleware::RequireUser;
use crate::models::{CurrentUser, session_keys};
use crate::security::{PasswordError, verify_password};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

/// Authenticate and establish a session.
#[instrument(skip(state, session, input), fields(username = %input.username))]
async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(input): Json<LoginRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let users = UserRepository::new(state.pool());

    let Some((user, password_hash)) = users
        .get_with_password_hash(state.cipher(), &input.username)
        .await?
    else {
        // Same response as a wrong password: never reveal which part
        // was wrong.
        return Err(AppError::Unauthorized("invalid username or password".to_owned()));
    };

    match verify_password(&input.password, &password_hash) {
        Ok(()) => {}
        Err(PasswordError::Mismatch) => {
            return Err(AppError::Unauthorized("invalid username or password".to_owned()));
        }
        Err(e) => return Err(AppError::Internal(e.to_string())),
    }

    let current = CurrentUser {
        id: user.id,
        username: user.username.clone(),
        role: user.role,
    };
    session
        .insert(session_keys::CURRENT_USER, &current)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    tracing::info!(user_id = %user.id, "user logged in");

    Ok(Json(json!({
        "success": true,
        "username": current.username,
        "role": current.role,
    })))
}

/// Destroy the session.
async fn logout(session: Session) -> Result<Json<serde_json::Value>, AppError> {
    session
        .flush()
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(json!({ "success": true })))
}

/// Who am I, and which credential sets are configured.
async fn me(
    RequireUser(current): RequireUser,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = state.load_user(current.id).await?;

    Ok(Json(json!({
        "id": user.id,
        "username": user.username,
        "role": user.role,
        "trendyolConfigured": user.credentials.has_trendyol(),
        "smartbillConfigured": user.credentials.has_smartbill(),
    })))
}
