//! Contribution badge endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::normalize_address;
use crate::badges::{self, BadgeEligibility, BadgeMetadata, TierRequirement};
use crate::state::AppState;

use super::HttpError;

const MAX_LEADERBOARD_LIMIT: usize = 100;
/// Donation events sampled per leaderboard computation.
const LEADERBOARD_SAMPLE: usize = 200;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/eligibility/{address}", get(eligibility))
        .route("/metadata/{address}", get(metadata))
        .route("/requirements", get(requirements))
        .route("/leaderboard", get(leaderboard))
}

#[derive(Debug, Serialize)]
struct EligibilityResponse {
    address: String,
    #[serde(flatten)]
    eligibility: BadgeEligibility,
    checked_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Default)]
struct LeaderboardQuery {
    chain: Option<String>,
    limit: Option<usize>,
}

async fn eligibility(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<EligibilityResponse>, HttpError> {
    let address = normalize_address(&address)
        .map_err(|err| HttpError::new(StatusCode::BAD_REQUEST, err.to_string()))?;
    let contributions = state.chains.multi_contribution(&address).await;
    let summary = badges::summarize(&contributions);
    Ok(Json(EligibilityResponse {
        address,
        eligibility: badges::eligibility(&summary),
        checked_at: Utc::now(),
    }))
}

async fn metadata(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<BadgeMetadata>, HttpError> {
    let address = normalize_address(&address)
        .map_err(|err| HttpError::new(StatusCode::BAD_REQUEST, err.to_string()))?;
    let contributions = state.chains.multi_contribution(&address).await;
    let summary = badges::summarize(&contributions);
    let metadata = badges::badge_metadata(&summary, Utc::now()).ok_or_else(|| {
        HttpError::new(
            StatusCode::NOT_FOUND,
            format!("No badge earned yet for {address}"),
        )
    })?;
    Ok(Json(metadata))
}

async fn requirements() -> Json<Vec<TierRequirement>> {
    Json(badges::requirements())
}

async fn leaderboard(
    Query(query): Query<LeaderboardQuery>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, HttpError> {
    let limit = query.limit.unwrap_or(10).min(MAX_LEADERBOARD_LIMIT);
    if limit == 0 {
        return Err(HttpError::new(
            StatusCode::BAD_REQUEST,
            "limit must be positive".to_string(),
        ));
    }

    let cache_key = format!(
        "{}:{limit}",
        query.chain.as_deref().unwrap_or("all")
    );
    if let Some(cached) = state.cache.leaderboards.get(&cache_key).await {
        return Ok(Json(cached));
    }

    let records = match query.chain.as_deref() {
        Some(chain) => state
            .chains
            .recent_activity_for(chain, LEADERBOARD_SAMPLE)
            .await
            .ok_or_else(|| {
                HttpError::new(StatusCode::NOT_FOUND, format!("Chain {chain} not found"))
            })?,
        None => state.chains.recent_activity(LEADERBOARD_SAMPLE).await,
    };

    let entries = badges::rank_donors(&records, limit);
    let body = serde_json::json!({
        "leaderboard": entries,
        "sampled_donations": records.len(),
        "generated_at": Utc::now(),
    });
    state
        .cache
        .leaderboards
        .insert(cache_key, body.clone())
        .await;
    Ok(Json(body))
}
