//! Faucet request state machine.
//!
//! One claim per cooldown window per (user, chain). A request inserts an
//! append-only history row whose `cooldown_until` blocks further requests
//! until it elapses. The check-then-insert sequence runs inside a transaction
//! holding an exclusive lock on the user row, so two concurrent requests from
//! the same user cannot both pass the cooldown check.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, IntoActiveModel,
    QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::chains::{ChainManager, ContractCallInfo};
use crate::config::ChainEntry;
use crate::entities::faucet_request::{RequestSource, RequestStatus};
use crate::entities::{donation_pool, faucet_config, faucet_request, user};

#[derive(Debug, Error)]
pub enum FaucetError {
    #[error("User not found")]
    UserNotFound,
    #[error("Chain {0} not configured in database")]
    ChainNotConfigured(String),
    #[error("Unsupported chain: {0}")]
    UnsupportedChain(String),
    #[error("Cooldown active. Try again in {hours} hours")]
    CooldownActive {
        hours: i64,
        remaining_ms: i64,
        until: DateTime<Utc>,
    },
    #[error("Request {0} not found")]
    RequestNotFound(i64),
    #[error("Request already {0:?}; status can only move forward")]
    InvalidTransition(RequestStatus),
    #[error(transparent)]
    Database(#[from] DbErr),
}

#[derive(Debug, Clone, Serialize)]
pub struct FaucetRequestOutcome {
    pub request_id: i64,
    pub chain: String,
    pub amount: String,
    pub cooldown_until: DateTime<Utc>,
    #[serde(flatten)]
    pub action: FaucetAction,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FaucetAction {
    /// Official faucet: the frontend follows the redirect.
    Redirect { redirect_url: String },
    /// Community pool: the frontend calls the contract directly.
    ContractCall {
        #[serde(skip_serializing_if = "Option::is_none")]
        contract: Option<ContractCallInfo>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct CooldownStatus {
    pub can_claim: bool,
    pub remaining_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_request: Option<LastRequestView>,
}

impl CooldownStatus {
    fn fresh() -> Self {
        Self {
            can_claim: true,
            remaining_ms: 0,
            last_request: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LastRequestView {
    pub id: i64,
    pub source: RequestSource,
    pub status: RequestStatus,
    pub requested_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FaucetStatistics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub success_rate: f64,
    pub breakdown: Vec<StatBucket>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatBucket {
    pub chain: String,
    pub source: RequestSource,
    pub status: RequestStatus,
    pub count: u64,
}

pub struct FaucetService {
    database: DatabaseConnection,
    chains: Arc<ChainManager>,
}

impl FaucetService {
    pub fn new(database: DatabaseConnection, chains: Arc<ChainManager>) -> Self {
        Self { database, chains }
    }

    pub async fn request_faucet(
        &self,
        user_id: i64,
        chain: &str,
        source: RequestSource,
    ) -> Result<FaucetRequestOutcome, FaucetError> {
        if !self.chains.contains(chain) {
            return Err(FaucetError::UnsupportedChain(chain.to_string()));
        }

        let txn = self.database.begin().await?;

        let requester = user::Entity::find_by_id(user_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or(FaucetError::UserNotFound)?;

        let chain_config = faucet_config::Entity::find_by_id(chain)
            .one(&txn)
            .await?
            .ok_or_else(|| FaucetError::ChainNotConfigured(chain.to_string()))?;

        let now = Utc::now();
        let blocking = faucet_request::Entity::find()
            .filter(faucet_request::Column::UserId.eq(requester.id))
            .filter(faucet_request::Column::Chain.eq(chain))
            .filter(faucet_request::Column::CooldownUntil.gt(now.fixed_offset()))
            .order_by_desc(faucet_request::Column::RequestedAt)
            .one(&txn)
            .await?;
        if let Some(blocking) = blocking {
            let until = blocking.cooldown_until.with_timezone(&Utc);
            let remaining = remaining_ms(until, now);
            return Err(FaucetError::CooldownActive {
                hours: rounded_up_hours(remaining),
                remaining_ms: remaining,
                until,
            });
        }

        let cooldown_until = now + Duration::hours(i64::from(chain_config.cooldown_hours));
        let status = match source {
            RequestSource::OfficialFaucet => RequestStatus::Pending,
            RequestSource::CommunityPool => RequestStatus::Processing,
        };
        let inserted = faucet_request::Entity::insert(faucet_request::ActiveModel {
            id: NotSet,
            user_id: Set(requester.id),
            chain: Set(chain.to_string()),
            token: Set(chain_config.token.clone()),
            amount: Set(chain_config.max_amount.clone()),
            source: Set(source),
            status: Set(status),
            requested_at: Set(now.fixed_offset()),
            completed_at: Set(None),
            cooldown_until: Set(cooldown_until.fixed_offset()),
            tx_hash: Set(None),
        })
        .exec(&txn)
        .await?;
        txn.commit().await?;

        info!(
            "Faucet request {} created: {:?} on {} by {}",
            inserted.last_insert_id, source, chain, requester.address
        );

        let action = match source {
            RequestSource::OfficialFaucet => FaucetAction::Redirect {
                redirect_url: chain_config.faucet_url.clone(),
            },
            RequestSource::CommunityPool => FaucetAction::ContractCall {
                contract: self.chains.contract_call_info(chain),
            },
        };

        Ok(FaucetRequestOutcome {
            request_id: inserted.last_insert_id,
            chain: chain.to_string(),
            amount: chain_config.max_amount,
            cooldown_until,
            action,
        })
    }

    /// Read-only cooldown view. Users without any history can claim
    /// everywhere; unknown addresses are treated the same way.
    pub async fn cooldown_status(
        &self,
        address: &str,
        chain: Option<&str>,
    ) -> Result<BTreeMap<String, CooldownStatus>, FaucetError> {
        let chains: Vec<String> = match chain {
            Some(chain) => vec![chain.to_string()],
            None => self.chains.supported_chains(),
        };

        let known = user::Entity::find()
            .filter(user::Column::Address.eq(address.to_ascii_lowercase()))
            .one(&self.database)
            .await?;
        let Some(known) = known else {
            return Ok(chains
                .into_iter()
                .map(|chain| (chain, CooldownStatus::fresh()))
                .collect());
        };

        let now = Utc::now();
        let mut result = BTreeMap::new();
        for chain in chains {
            let latest = faucet_request::Entity::find()
                .filter(faucet_request::Column::UserId.eq(known.id))
                .filter(faucet_request::Column::Chain.eq(chain.as_str()))
                .order_by_desc(faucet_request::Column::RequestedAt)
                .one(&self.database)
                .await?;
            result.insert(chain, status_from_latest(latest.as_ref(), now));
        }
        Ok(result)
    }

    /// One-way status transition; terminal states stamp `completed_at`.
    pub async fn update_status(
        &self,
        request_id: i64,
        status: RequestStatus,
        tx_hash: Option<String>,
    ) -> Result<faucet_request::Model, FaucetError> {
        let existing = faucet_request::Entity::find_by_id(request_id)
            .one(&self.database)
            .await?
            .ok_or(FaucetError::RequestNotFound(request_id))?;
        if status.rank() <= existing.status.rank() {
            return Err(FaucetError::InvalidTransition(existing.status));
        }

        let mut active = existing.into_active_model();
        active.status = Set(status);
        if let Some(tx_hash) = tx_hash {
            active.tx_hash = Set(Some(tx_hash));
        }
        if status.is_terminal() {
            active.completed_at = Set(Some(Utc::now().fixed_offset()));
        }
        let updated = active.update(&self.database).await?;
        info!("Request {} updated to {:?}", request_id, status);
        Ok(updated)
    }

    pub async fn user_history(
        &self,
        address: &str,
        limit: u64,
    ) -> Result<Vec<faucet_request::Model>, FaucetError> {
        let known = user::Entity::find()
            .filter(user::Column::Address.eq(address.to_ascii_lowercase()))
            .one(&self.database)
            .await?;
        let Some(known) = known else {
            return Ok(Vec::new());
        };
        let history = faucet_request::Entity::find()
            .filter(faucet_request::Column::UserId.eq(known.id))
            .order_by_desc(faucet_request::Column::RequestedAt)
            .limit(limit)
            .all(&self.database)
            .await?;
        Ok(history)
    }

    pub async fn statistics(&self) -> Result<FaucetStatistics, FaucetError> {
        let rows: Vec<(String, RequestSource, RequestStatus, i64)> =
            faucet_request::Entity::find()
                .select_only()
                .column(faucet_request::Column::Chain)
                .column(faucet_request::Column::Source)
                .column(faucet_request::Column::Status)
                .column_as(faucet_request::Column::Id.count(), "count")
                .group_by(faucet_request::Column::Chain)
                .group_by(faucet_request::Column::Source)
                .group_by(faucet_request::Column::Status)
                .into_tuple()
                .all(&self.database)
                .await?;

        let breakdown: Vec<StatBucket> = rows
            .into_iter()
            .map(|(chain, source, status, count)| StatBucket {
                chain,
                source,
                status,
                count: count.max(0) as u64,
            })
            .collect();
        Ok(summarize_statistics(breakdown))
    }
}

/// Mirrors the configured chains into `faucet_configs` and `donation_pools`
/// at boot; pools are created empty and never overwritten.
pub async fn sync_chain_configs(
    database: &DatabaseConnection,
    entries: &[ChainEntry],
) -> Result<(), DbErr> {
    for entry in entries {
        faucet_config::Entity::insert(faucet_config::ActiveModel {
            chain: Set(entry.id.clone()),
            name: Set(entry.name.clone()),
            token: Set(entry.symbol.clone()),
            rpc_url: Set(entry.rpc_url.clone()),
            faucet_url: Set(entry.faucet_url.clone()),
            cooldown_hours: Set(entry.cooldown_hours),
            max_amount: Set(entry.max_amount.clone()),
            min_balance: Set(entry.min_balance.clone()),
        })
        .on_conflict(
            OnConflict::column(faucet_config::Column::Chain)
                .update_columns([
                    faucet_config::Column::Name,
                    faucet_config::Column::Token,
                    faucet_config::Column::RpcUrl,
                    faucet_config::Column::FaucetUrl,
                    faucet_config::Column::CooldownHours,
                    faucet_config::Column::MaxAmount,
                    faucet_config::Column::MinBalance,
                ])
                .to_owned(),
        )
        .exec(database)
        .await?;

        let pool_insert = donation_pool::Entity::insert(donation_pool::ActiveModel {
            chain: Set(entry.id.clone()),
            token: Set(entry.symbol.clone()),
            total_amount: Set("0".to_string()),
            available: Set("0".to_string()),
            distributed: Set("0".to_string()),
        })
        .on_conflict(
            OnConflict::column(donation_pool::Column::Chain)
                .do_nothing()
                .to_owned(),
        )
        .exec(database)
        .await;
        match pool_insert {
            Ok(_) | Err(DbErr::RecordNotInserted) => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

fn status_from_latest(
    latest: Option<&faucet_request::Model>,
    now: DateTime<Utc>,
) -> CooldownStatus {
    let Some(latest) = latest else {
        return CooldownStatus::fresh();
    };
    let remaining = remaining_ms(latest.cooldown_until.with_timezone(&Utc), now);
    CooldownStatus {
        can_claim: remaining == 0,
        remaining_ms: remaining,
        last_request: Some(LastRequestView {
            id: latest.id,
            source: latest.source,
            status: latest.status,
            requested_at: latest.requested_at.with_timezone(&Utc),
            completed_at: latest.completed_at.map(|at| at.with_timezone(&Utc)),
        }),
    }
}

pub fn remaining_ms(cooldown_until: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (cooldown_until - now).num_milliseconds().max(0)
}

/// Rejection messages report whole hours, rounded up.
pub fn rounded_up_hours(remaining_ms: i64) -> i64 {
    assert!(remaining_ms >= 0, "Remaining time cannot be negative");
    (remaining_ms + 3_599_999) / 3_600_000
}

fn summarize_statistics(breakdown: Vec<StatBucket>) -> FaucetStatistics {
    let total_requests: u64 = breakdown.iter().map(|bucket| bucket.count).sum();
    let successful_requests: u64 = breakdown
        .iter()
        .filter(|bucket| bucket.status == RequestStatus::Success)
        .map(|bucket| bucket.count)
        .sum();
    let success_rate = if total_requests > 0 {
        successful_requests as f64 / total_requests as f64 * 100.0
    } else {
        0.0
    };
    FaucetStatistics {
        total_requests,
        successful_requests,
        success_rate,
        breakdown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn remaining_time_clamps_at_zero() {
        let start = Utc.with_ymd_and_hms(2026, 1, 6, 0, 0, 0).unwrap();
        let until = start + Duration::hours(12);
        assert_eq!(remaining_ms(until, start), 43_200_000);
        assert_eq!(remaining_ms(until, start + Duration::hours(6)), 21_600_000);
        assert_eq!(remaining_ms(until, until), 0);
        assert_eq!(
            remaining_ms(until, until + Duration::milliseconds(1)),
            0
        );
    }

    #[test]
    fn hours_round_up() {
        assert_eq!(rounded_up_hours(0), 0);
        assert_eq!(rounded_up_hours(1), 1);
        assert_eq!(rounded_up_hours(3_600_000), 1);
        assert_eq!(rounded_up_hours(3_600_001), 2);
        assert_eq!(rounded_up_hours(21_600_000), 6);
        assert_eq!(rounded_up_hours(21_600_001), 7);
    }

    #[test]
    fn latest_request_drives_cooldown_view() {
        let now = Utc.with_ymd_and_hms(2026, 1, 6, 12, 0, 0).unwrap();
        assert!(status_from_latest(None, now).can_claim);

        let row = faucet_request::Model {
            id: 7,
            user_id: 1,
            chain: "ethereum".to_string(),
            token: "ETH".to_string(),
            amount: "0.5".to_string(),
            source: RequestSource::OfficialFaucet,
            status: RequestStatus::Pending,
            requested_at: now.fixed_offset(),
            completed_at: None,
            cooldown_until: (now + Duration::hours(12)).fixed_offset(),
            tx_hash: None,
        };
        let blocked = status_from_latest(Some(&row), now + Duration::hours(6));
        assert!(!blocked.can_claim);
        assert_eq!(blocked.remaining_ms, 21_600_000);
        assert_eq!(blocked.last_request.as_ref().unwrap().id, 7);

        let elapsed = status_from_latest(Some(&row), now + Duration::hours(12) + Duration::milliseconds(1));
        assert!(elapsed.can_claim);
        assert_eq!(elapsed.remaining_ms, 0);
    }

    #[test]
    fn cooldown_rejection_reports_rounded_hours() {
        let err = FaucetError::CooldownActive {
            hours: rounded_up_hours(21_600_001),
            remaining_ms: 21_600_001,
            until: Utc::now(),
        };
        assert_eq!(err.to_string(), "Cooldown active. Try again in 7 hours");
    }

    #[test]
    fn statistics_summary() {
        let stats = summarize_statistics(vec![
            StatBucket {
                chain: "ethereum".to_string(),
                source: RequestSource::OfficialFaucet,
                status: RequestStatus::Success,
                count: 3,
            },
            StatBucket {
                chain: "sui".to_string(),
                source: RequestSource::CommunityPool,
                status: RequestStatus::Failed,
                count: 1,
            },
        ]);
        assert_eq!(stats.total_requests, 4);
        assert_eq!(stats.successful_requests, 3);
        assert!((stats.success_rate - 75.0).abs() < 1e-9);

        let empty = summarize_statistics(Vec::new());
        assert_eq!(empty.success_rate, 0.0);
    }
}
