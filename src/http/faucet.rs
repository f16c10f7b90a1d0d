//! Faucet request endpoints: claim, cooldown view, history, status updates.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::normalize_address;
use crate::entities::faucet_request;
use crate::entities::faucet_request::{RequestSource, RequestStatus};
use crate::events::ToastEvent;
use crate::faucet::{FaucetError, FaucetRequestOutcome, FaucetStatistics};
use crate::state::AppState;

use super::{AuthUser, HttpError};

const MAX_HISTORY_LIMIT: u64 = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/request", post(request_tokens))
        .route("/request/{request_id}/status", patch(update_request_status))
        .route("/cooldown/{address}", get(cooldown_status))
        .route("/history/{address}", get(request_history))
        .route("/statistics", get(statistics))
}

#[derive(Debug, Deserialize)]
struct FaucetRequestBody {
    chain: String,
    source: RequestSource,
}

#[derive(Debug, Serialize)]
struct FaucetRequestResponse {
    success: bool,
    message: &'static str,
    #[serde(flatten)]
    outcome: FaucetRequestOutcome,
}

#[derive(Debug, Deserialize)]
struct UpdateStatusBody {
    status: RequestStatus,
    tx_hash: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CooldownQuery {
    chain: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct HistoryQuery {
    limit: Option<u64>,
}

#[derive(Debug, Serialize)]
struct RequestView {
    id: i64,
    chain: String,
    token: String,
    amount: String,
    source: RequestSource,
    status: RequestStatus,
    requested_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,
    cooldown_until: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tx_hash: Option<String>,
}

impl From<faucet_request::Model> for RequestView {
    fn from(model: faucet_request::Model) -> Self {
        Self {
            id: model.id,
            chain: model.chain,
            token: model.token,
            amount: model.amount,
            source: model.source,
            status: model.status,
            requested_at: model.requested_at.with_timezone(&Utc),
            completed_at: model.completed_at.map(|at| at.with_timezone(&Utc)),
            cooldown_until: model.cooldown_until.with_timezone(&Utc),
            tx_hash: model.tx_hash,
        }
    }
}

async fn request_tokens(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<FaucetRequestBody>,
) -> Result<Json<FaucetRequestResponse>, HttpError> {
    let outcome = state
        .faucet
        .request_faucet(user.user_id, &body.chain, body.source)
        .await
        .map_err(map_faucet_error)?;

    state.events.publish(ToastEvent::FaucetRequested {
        chain: outcome.chain.clone(),
        address: user.address,
        source: body.source,
        cooldown_until: outcome.cooldown_until,
    });

    let message = match body.source {
        RequestSource::OfficialFaucet => "Redirecting to official faucet",
        RequestSource::CommunityPool => "Call the donation pool contract directly",
    };
    Ok(Json(FaucetRequestResponse {
        success: true,
        message,
        outcome,
    }))
}

async fn update_request_status(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(request_id): Path<i64>,
    Json(body): Json<UpdateStatusBody>,
) -> Result<Json<RequestView>, HttpError> {
    let updated = state
        .faucet
        .update_status(request_id, body.status, body.tx_hash)
        .await
        .map_err(map_faucet_error)?;

    state.events.publish(ToastEvent::RequestStatusChanged {
        request_id: updated.id,
        chain: updated.chain.clone(),
        status: updated.status,
        tx_hash: updated.tx_hash.clone(),
    });

    Ok(Json(updated.into()))
}

async fn cooldown_status(
    Path(address): Path<String>,
    Query(query): Query<CooldownQuery>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, HttpError> {
    let address = normalize_address(&address)
        .map_err(|err| HttpError::new(StatusCode::BAD_REQUEST, err.to_string()))?;

    if let Some(chain) = query.chain.as_deref() {
        if !state.chains.contains(chain) {
            return Err(HttpError::new(
                StatusCode::NOT_FOUND,
                format!("Chain {chain} not found"),
            ));
        }
    }

    let mut statuses = state
        .faucet
        .cooldown_status(&address, query.chain.as_deref())
        .await
        .map_err(map_faucet_error)?;

    // A single-chain query answers with that chain's object directly.
    let body = match query.chain.as_deref() {
        Some(chain) => {
            let status = statuses
                .remove(chain)
                .expect("requested chain present in cooldown map");
            serde_json::to_value(status)
        }
        None => serde_json::to_value(statuses),
    }
    .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
    Ok(Json(body))
}

async fn request_history(
    Path(address): Path<String>,
    Query(query): Query<HistoryQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<RequestView>>, HttpError> {
    let address = normalize_address(&address)
        .map_err(|err| HttpError::new(StatusCode::BAD_REQUEST, err.to_string()))?;
    let limit = query.limit.unwrap_or(20).min(MAX_HISTORY_LIMIT);
    let history = state
        .faucet
        .user_history(&address, limit)
        .await
        .map_err(map_faucet_error)?;
    assert!(
        history.len() as u64 <= limit,
        "Returned more requests than requested"
    );
    Ok(Json(history.into_iter().map(RequestView::from).collect()))
}

async fn statistics(
    State(state): State<AppState>,
) -> Result<Json<FaucetStatistics>, HttpError> {
    let stats = state.faucet.statistics().await.map_err(map_faucet_error)?;
    Ok(Json(stats))
}

fn map_faucet_error(err: FaucetError) -> HttpError {
    let status = match &err {
        FaucetError::CooldownActive { .. } => StatusCode::TOO_MANY_REQUESTS,
        FaucetError::UserNotFound
        | FaucetError::ChainNotConfigured(_)
        | FaucetError::UnsupportedChain(_)
        | FaucetError::InvalidTransition(_) => StatusCode::BAD_REQUEST,
        FaucetError::RequestNotFound(_) => StatusCode::NOT_FOUND,
        FaucetError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    HttpError::new(status, err.to_string())
}
