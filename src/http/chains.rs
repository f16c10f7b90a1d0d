//! Chain status, cooldown, and contribution endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use sea_orm::EntityTrait;
use serde::{Deserialize, Serialize};

use crate::auth::normalize_address;
use crate::chains::{
    ChainDescriptor, ChainHealth, ChainStatistics, ContributionInfo, CooldownInfo, DonationRecord,
    PoolStatistics,
};
use crate::entities::donation_pool;
use crate::state::AppState;

use super::HttpError;

const MAX_ACTIVITY_LIMIT: usize = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(all_chains_status))
        .route("/status/{chain_id}", get(chain_status))
        .route("/supported", get(supported_chains))
        .route("/health", get(health_check))
        .route("/recent-activity", get(recent_activity))
        .route("/multi-cooldown/{address}", get(multi_cooldown))
        .route("/multi-contribution/{address}", get(multi_contribution))
        .route("/{chain_id}/cooldown/{address}", get(chain_cooldown))
        .route("/{chain_id}/contribution/{address}", get(chain_contribution))
        .route("/{chain_id}/pool-statistics", get(pool_statistics))
        .route("/{chain_id}/donation-pool", get(donation_pool_mirror))
}

#[derive(Debug, Serialize)]
struct AllChainsStatusResponse {
    chains: Vec<ChainStatusView>,
    total_chains: usize,
    active_chains: usize,
    last_updated: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct ChainStatusView {
    chain_id: String,
    is_active: bool,
    #[serde(flatten)]
    statistics: ChainStatistics,
}

#[derive(Debug, Serialize)]
struct SupportedChainsResponse<'a> {
    chains: Vec<String>,
    configs: Vec<&'a ChainDescriptor>,
    count: usize,
}

#[derive(Debug, Serialize)]
struct MultiCooldownResponse {
    address: String,
    cooldowns: BTreeMap<String, CooldownInfo>,
    checked_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct MultiContributionResponse {
    address: String,
    contributions: BTreeMap<String, ContributionInfo>,
    summary: crate::badges::ContributionSummary,
    checked_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Default)]
struct ActivityQuery {
    limit: Option<usize>,
}

async fn all_chains_status(
    State(state): State<AppState>,
) -> Result<Json<AllChainsStatusResponse>, HttpError> {
    let statistics = state.chains.all_statistics().await;
    let chains: Vec<ChainStatusView> = statistics
        .into_iter()
        .map(|(chain_id, statistics)| ChainStatusView {
            chain_id,
            is_active: !statistics.degraded,
            statistics,
        })
        .collect();
    let active_chains = chains.iter().filter(|chain| chain.is_active).count();

    Ok(Json(AllChainsStatusResponse {
        total_chains: chains.len(),
        active_chains,
        chains,
        last_updated: Utc::now(),
    }))
}

async fn chain_status(
    Path(chain_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ChainStatusView>, HttpError> {
    let statistics = cached_statistics(&state, &chain_id).await?;
    Ok(Json(ChainStatusView {
        chain_id,
        is_active: !statistics.degraded,
        statistics: (*statistics).clone(),
    }))
}

async fn supported_chains(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, HttpError> {
    let chains = state.chains.supported_chains();
    let descriptors = state.chains.descriptors();
    let response = SupportedChainsResponse {
        count: chains.len(),
        chains,
        configs: descriptors,
    };
    serde_json::to_value(&response)
        .map(Json)
        .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))
}

async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<String, ChainHealth>>, HttpError> {
    Ok(Json(state.chains.health_check().await))
}

async fn chain_cooldown(
    Path((chain_id, address)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<CooldownInfo>, HttpError> {
    let address = normalize_address(&address)
        .map_err(|err| HttpError::new(StatusCode::BAD_REQUEST, err.to_string()))?;
    let info = state
        .chains
        .check_faucet_cooldown(&chain_id, &address)
        .await
        .ok_or_else(|| unknown_chain(&chain_id))?;
    Ok(Json(info))
}

async fn chain_contribution(
    Path((chain_id, address)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<ContributionInfo>, HttpError> {
    let address = normalize_address(&address)
        .map_err(|err| HttpError::new(StatusCode::BAD_REQUEST, err.to_string()))?;

    let cache_key = format!("{chain_id}:{address}");
    if let Some(cached) = state.cache.contributions.get(&cache_key).await {
        return Ok(Json((*cached).clone()));
    }

    let info = state
        .chains
        .user_contribution(&chain_id, &address)
        .await
        .ok_or_else(|| unknown_chain(&chain_id))?;
    state
        .cache
        .contributions
        .insert(cache_key, Arc::new(info.clone()))
        .await;
    Ok(Json(info))
}

async fn pool_statistics(
    Path(chain_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<PoolStatistics>, HttpError> {
    let statistics = cached_statistics(&state, &chain_id).await?;
    Ok(Json(statistics.statistics.clone()))
}

/// Database mirror of the on-chain pool, seeded at boot. The chain itself is
/// the source of truth; see `pool-statistics` for live numbers.
async fn donation_pool_mirror(
    Path(chain_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<donation_pool::Model>, HttpError> {
    let pool = donation_pool::Entity::find_by_id(&chain_id)
        .one(&state.database)
        .await
        .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?
        .ok_or_else(|| unknown_chain(&chain_id))?;
    Ok(Json(pool))
}

async fn multi_cooldown(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<MultiCooldownResponse>, HttpError> {
    let address = normalize_address(&address)
        .map_err(|err| HttpError::new(StatusCode::BAD_REQUEST, err.to_string()))?;
    let cooldowns = state.chains.multi_cooldown(&address).await;
    assert_eq!(
        cooldowns.len(),
        state.chains.supported_chains().len(),
        "Multi-chain response dropped a chain entry",
    );
    Ok(Json(MultiCooldownResponse {
        address,
        cooldowns,
        checked_at: Utc::now(),
    }))
}

async fn multi_contribution(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<MultiContributionResponse>, HttpError> {
    let address = normalize_address(&address)
        .map_err(|err| HttpError::new(StatusCode::BAD_REQUEST, err.to_string()))?;
    let contributions = state.chains.multi_contribution(&address).await;
    let summary = crate::badges::summarize(&contributions);
    Ok(Json(MultiContributionResponse {
        address,
        contributions,
        summary,
        checked_at: Utc::now(),
    }))
}

async fn recent_activity(
    Query(query): Query<ActivityQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<DonationRecord>>, HttpError> {
    let limit = query.limit.unwrap_or(20).min(MAX_ACTIVITY_LIMIT);
    if limit == 0 {
        return Err(HttpError::new(
            StatusCode::BAD_REQUEST,
            "limit must be positive".to_string(),
        ));
    }
    let records = state.chains.recent_activity(limit).await;
    assert!(
        records.windows(2).all(|w| w[0].timestamp >= w[1].timestamp),
        "Activity records out of order"
    );
    Ok(Json(records))
}

async fn cached_statistics(
    state: &AppState,
    chain_id: &str,
) -> Result<Arc<ChainStatistics>, HttpError> {
    if let Some(cached) = state.cache.chain_statistics.get(chain_id).await {
        return Ok(cached);
    }
    let statistics = state
        .chains
        .chain_statistics(chain_id)
        .await
        .ok_or_else(|| unknown_chain(chain_id))?;
    let shared = Arc::new(statistics);
    state
        .cache
        .chain_statistics
        .insert(chain_id.to_string(), Arc::clone(&shared))
        .await;
    Ok(shared)
}

fn unknown_chain(chain_id: &str) -> HttpError {
    HttpError::new(
        StatusCode::NOT_FOUND,
        format!("Chain {chain_id} not found"),
    )
}
