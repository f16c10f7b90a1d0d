//! Wallet login: nonce challenge plus signature verification.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, QueryFilter};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::{
    challenge_message, extract_nonce, generate_nonce, normalize_address, verify_wallet_signature,
};
use crate::entities::{auth_nonce, user};
use crate::state::AppState;

use super::HttpError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/nonce", get(issue_nonce))
        .route("/login", post(login))
}

#[derive(Debug, Deserialize)]
struct NonceQuery {
    address: String,
}

#[derive(Debug, Serialize)]
struct NonceResponse {
    address: String,
    nonce: String,
    message: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    address: String,
    signature: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    access_token: String,
    token_type: &'static str,
    user: UserView,
}

#[derive(Debug, Serialize)]
struct UserView {
    id: i64,
    address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    created_at: DateTime<Utc>,
}

async fn issue_nonce(
    Query(query): Query<NonceQuery>,
    State(state): State<AppState>,
) -> Result<Json<NonceResponse>, HttpError> {
    let address = normalize_address(&query.address)
        .map_err(|err| HttpError::new(StatusCode::BAD_REQUEST, err.to_string()))?;

    let now = Utc::now();
    let nonce = generate_nonce();
    let expires_at = state.auth.nonce_expiry(now);
    auth_nonce::ActiveModel {
        address: Set(address.clone()),
        nonce: Set(nonce.clone()),
        expires_at: Set(expires_at.fixed_offset()),
        used_at: Set(None),
    }
    .insert(&state.database)
    .await
    .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    let message = challenge_message(&address, &nonce, now);
    Ok(Json(NonceResponse {
        address,
        nonce,
        message,
        expires_at,
    }))
}

/// Verifies the signed challenge and returns a bearer token, creating the
/// user on first login. Every verification failure collapses into the same
/// generic response.
async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, HttpError> {
    let address =
        normalize_address(&body.address).map_err(|_| HttpError::authentication_failed())?;
    let nonce = extract_nonce(&body.message).ok_or_else(HttpError::authentication_failed)?;

    let challenge = auth_nonce::Entity::find()
        .filter(auth_nonce::Column::Address.eq(address.clone()))
        .filter(auth_nonce::Column::Nonce.eq(nonce))
        .one(&state.database)
        .await
        .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?
        .ok_or_else(HttpError::authentication_failed)?;

    let now = Utc::now();
    if challenge.used_at.is_some() || challenge.expires_at.with_timezone(&Utc) <= now {
        return Err(HttpError::authentication_failed());
    }

    verify_wallet_signature(&address, &body.message, &body.signature)
        .map_err(|_| HttpError::authentication_failed())?;

    let mut used = challenge.into_active_model();
    used.used_at = Set(Some(now.fixed_offset()));
    used.update(&state.database)
        .await
        .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    let account = match user::Entity::find()
        .filter(user::Column::Address.eq(address.clone()))
        .one(&state.database)
        .await
        .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?
    {
        Some(existing) => existing,
        None => {
            let created = user::ActiveModel {
                id: NotSet,
                address: Set(address.clone()),
                email: Set(None),
                created_at: Set(now.fixed_offset()),
            }
            .insert(&state.database)
            .await
            .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
            info!("User created for {address}");
            created
        }
    };

    let access_token = state
        .auth
        .issue(account.id, &account.address, now)
        .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    Ok(Json(LoginResponse {
        access_token,
        token_type: "Bearer",
        user: UserView {
            id: account.id,
            address: account.address,
            email: account.email,
            created_at: account.created_at.with_timezone(&Utc),
        },
    }))
}
