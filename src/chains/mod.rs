//! Chain adapter registry and fan-out.
//!
//! Every supported chain answers the same three questions for a user address:
//! can they claim now, what is their contribution tier, and what does the
//! donation pool look like. The [`ChainManager`] dispatches to the adapter for
//! the chain's family and shields callers from adapter failures: any RPC error
//! is logged and replaced with a well-formed degraded default, so multi-chain
//! responses always carry an entry per chain.

mod evm;
mod sui;

use std::collections::BTreeMap;
use std::future::Future;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ChainEntry;
use crate::tiers::{self, Tier};

pub use evm::EvmChain;
pub use sui::SuiChain;

/// Fallback cooldown reported when a chain cannot be queried: 24 hours.
pub const DEGRADED_COOLDOWN_MS: u64 = 86_400_000;

/// Donation events fetched per chain when building aggregate views.
const ACTIVITY_FETCH_LIMIT: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    Evm,
    Sui,
}

#[derive(Clone, Debug, Serialize)]
pub struct CooldownInfo {
    pub can_claim: bool,
    pub remaining_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_claim_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_claim_at: Option<DateTime<Utc>>,
}

impl CooldownInfo {
    /// First use is always free.
    pub fn fresh() -> Self {
        Self {
            can_claim: true,
            remaining_ms: 0,
            next_claim_at: None,
            last_claim_at: None,
        }
    }

    /// Substituted when the chain cannot be queried.
    pub fn degraded() -> Self {
        Self {
            can_claim: false,
            remaining_ms: DEGRADED_COOLDOWN_MS,
            next_claim_at: None,
            last_claim_at: None,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ContributionInfo {
    pub level: u8,
    pub level_name: &'static str,
    /// Cumulative donations in human units
    pub total_donated: f64,
    /// Same amount in the chain's smallest unit
    pub total_donated_raw: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_level_requirement: Option<f64>,
}

impl ContributionInfo {
    pub fn none() -> Self {
        contribution_from_raw(0, 0)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct PoolStatistics {
    pub current_balance: f64,
    pub total_donations: f64,
    pub total_claimed: f64,
    pub faucet_amount: f64,
    pub available_claims: u64,
    pub pool_reference: String,
}

impl PoolStatistics {
    pub fn degraded(pool_reference: &str) -> Self {
        Self {
            current_balance: 0.0,
            total_donations: 0.0,
            total_claimed: 0.0,
            faucet_amount: 0.0,
            available_claims: 0,
            pool_reference: pool_reference.to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct DonationRecord {
    pub chain: String,
    pub donor: String,
    /// Human units
    pub amount: f64,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub tx_hash: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ChainHealth {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ChainStatistics {
    pub family: ChainFamily,
    pub name: String,
    pub symbol: String,
    pub statistics: PoolStatistics,
    pub recent_activity: Vec<DonationRecord>,
    pub degraded: bool,
    pub last_updated: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ChainDescriptor {
    pub id: String,
    pub family: ChainFamily,
    pub name: String,
    pub symbol: String,
    pub faucet_url: String,
    pub cooldown_hours: i32,
    pub max_amount: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ContractCallInfo {
    pub contract_address: String,
    pub method: &'static str,
}

/// Uniform per-chain query surface. Implementations talk to their chain's RPC
/// and return errors freely; degradation happens once, in the manager.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn chain_id(&self) -> &str;
    fn family(&self) -> ChainFamily;
    fn display_name(&self) -> &str;
    fn symbol(&self) -> &str;
    /// Pool contract address or pool object id, empty when not deployed.
    fn pool_reference(&self) -> &str;

    async fn check_cooldown(&self, address: &str) -> Result<CooldownInfo>;
    async fn contribution(&self, address: &str) -> Result<ContributionInfo>;
    async fn pool_statistics(&self) -> Result<PoolStatistics>;
    async fn recent_donations(&self, limit: usize) -> Result<Vec<DonationRecord>>;
    async fn probe(&self) -> Result<serde_json::Value>;
}

pub struct ChainManager {
    adapters: BTreeMap<String, Box<dyn ChainAdapter>>,
    descriptors: BTreeMap<String, ChainDescriptor>,
}

impl ChainManager {
    pub async fn from_config(entries: &[ChainEntry]) -> Result<Self> {
        let mut adapters: Vec<Box<dyn ChainAdapter>> = Vec::with_capacity(entries.len());
        for entry in entries {
            let adapter: Box<dyn ChainAdapter> = match entry.family {
                ChainFamily::Evm => Box::new(EvmChain::connect(entry).await?),
                ChainFamily::Sui => Box::new(SuiChain::new(entry)?),
            };
            info!(
                "Chain adapter registered: {} ({:?})",
                entry.id, entry.family
            );
            adapters.push(adapter);
        }
        let descriptors = entries
            .iter()
            .map(|entry| {
                (
                    entry.id.clone(),
                    ChainDescriptor {
                        id: entry.id.clone(),
                        family: entry.family,
                        name: entry.name.clone(),
                        symbol: entry.symbol.clone(),
                        faucet_url: entry.faucet_url.clone(),
                        cooldown_hours: entry.cooldown_hours,
                        max_amount: entry.max_amount.clone(),
                    },
                )
            })
            .collect();
        Self::from_adapters(adapters, descriptors)
    }

    fn from_adapters(
        adapters: Vec<Box<dyn ChainAdapter>>,
        descriptors: BTreeMap<String, ChainDescriptor>,
    ) -> Result<Self> {
        let mut registry = BTreeMap::new();
        for adapter in adapters {
            let id = adapter.chain_id().to_string();
            assert!(!id.is_empty(), "Adapter chain id cannot be empty");
            let previous = registry.insert(id.clone(), adapter);
            assert!(previous.is_none(), "Duplicate chain id in registry");
        }
        Ok(Self {
            adapters: registry,
            descriptors,
        })
    }

    pub fn supported_chains(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }

    pub fn contains(&self, chain: &str) -> bool {
        self.adapters.contains_key(chain)
    }

    pub fn descriptors(&self) -> Vec<&ChainDescriptor> {
        self.descriptors.values().collect()
    }

    pub fn contract_call_info(&self, chain: &str) -> Option<ContractCallInfo> {
        let adapter = self.adapters.get(chain)?;
        let reference = adapter.pool_reference();
        if reference.is_empty() {
            return None;
        }
        Some(ContractCallInfo {
            contract_address: reference.to_string(),
            method: "requestFaucet",
        })
    }

    pub async fn check_faucet_cooldown(&self, chain: &str, address: &str) -> Option<CooldownInfo> {
        let adapter = self.adapters.get(chain)?;
        Some(
            degrade(
                chain,
                "cooldown query",
                adapter.check_cooldown(address),
                CooldownInfo::degraded,
            )
            .await,
        )
    }

    pub async fn user_contribution(&self, chain: &str, address: &str) -> Option<ContributionInfo> {
        let adapter = self.adapters.get(chain)?;
        Some(
            degrade(
                chain,
                "contribution query",
                adapter.contribution(address),
                ContributionInfo::none,
            )
            .await,
        )
    }

    pub async fn chain_statistics(&self, chain: &str) -> Option<ChainStatistics> {
        let adapter = self.adapters.get(chain)?;
        let (stats, activity) = tokio::join!(
            adapter.pool_statistics(),
            adapter.recent_donations(5)
        );
        let degraded = stats.is_err();
        let statistics = match stats {
            Ok(value) => value,
            Err(err) => {
                warn!("pool statistics failed on {chain}: {err:#}");
                PoolStatistics::degraded(adapter.pool_reference())
            }
        };
        let recent_activity = match activity {
            Ok(records) => records,
            Err(err) => {
                warn!("recent donations failed on {chain}: {err:#}");
                Vec::new()
            }
        };
        Some(ChainStatistics {
            family: adapter.family(),
            name: adapter.display_name().to_string(),
            symbol: adapter.symbol().to_string(),
            statistics,
            recent_activity,
            degraded,
            last_updated: Utc::now(),
        })
    }

    pub async fn all_statistics(&self) -> BTreeMap<String, ChainStatistics> {
        let futures = self.adapters.keys().map(|chain| async move {
            let stats = self
                .chain_statistics(chain)
                .await
                .expect("registry key resolves to an adapter");
            (chain.clone(), stats)
        });
        join_all(futures).await.into_iter().collect()
    }

    pub async fn multi_cooldown(&self, address: &str) -> BTreeMap<String, CooldownInfo> {
        let futures = self.adapters.values().map(|adapter| async move {
            let info = degrade(
                adapter.chain_id(),
                "cooldown query",
                adapter.check_cooldown(address),
                CooldownInfo::degraded,
            )
            .await;
            (adapter.chain_id().to_string(), info)
        });
        join_all(futures).await.into_iter().collect()
    }

    pub async fn multi_contribution(&self, address: &str) -> BTreeMap<String, ContributionInfo> {
        let futures = self.adapters.values().map(|adapter| async move {
            let info = degrade(
                adapter.chain_id(),
                "contribution query",
                adapter.contribution(address),
                ContributionInfo::none,
            )
            .await;
            (adapter.chain_id().to_string(), info)
        });
        join_all(futures).await.into_iter().collect()
    }

    /// Donation activity across every chain, merged and sorted newest first.
    pub async fn recent_activity(&self, limit: usize) -> Vec<DonationRecord> {
        let per_chain = ACTIVITY_FETCH_LIMIT.max(limit);
        let futures = self.adapters.values().map(|adapter| async move {
            degrade(
                adapter.chain_id(),
                "donation history",
                adapter.recent_donations(per_chain),
                Vec::new,
            )
            .await
        });
        let merged: Vec<DonationRecord> = join_all(futures).await.into_iter().flatten().collect();
        merge_recent(merged, limit)
    }

    pub async fn recent_activity_for(
        &self,
        chain: &str,
        limit: usize,
    ) -> Option<Vec<DonationRecord>> {
        let adapter = self.adapters.get(chain)?;
        let records = degrade(
            chain,
            "donation history",
            adapter.recent_donations(limit),
            Vec::new,
        )
        .await;
        Some(merge_recent(records, limit))
    }

    pub async fn health_check(&self) -> BTreeMap<String, ChainHealth> {
        let futures = self.adapters.values().map(|adapter| async move {
            let health = match adapter.probe().await {
                Ok(detail) => ChainHealth {
                    status: "healthy",
                    detail: Some(detail),
                    error: None,
                    checked_at: Utc::now(),
                },
                Err(err) => ChainHealth {
                    status: "unhealthy",
                    detail: None,
                    error: Some(format!("{err:#}")),
                    checked_at: Utc::now(),
                },
            };
            (adapter.chain_id().to_string(), health)
        });
        join_all(futures).await.into_iter().collect()
    }
}

/// The single failure-isolation point: adapter errors become logged warnings
/// plus a well-formed fallback value, never a propagated error.
async fn degrade<T, F>(chain: &str, op: &str, fut: F, fallback: impl FnOnce() -> T) -> T
where
    F: Future<Output = Result<T>>,
{
    match fut.await {
        Ok(value) => value,
        Err(err) => {
            warn!("{op} failed on {chain}: {err:#}");
            fallback()
        }
    }
}

/// Cooldown arithmetic shared by adapters that read a raw last-claim
/// timestamp: `remaining = max(0, last + cooldown - now)`.
pub fn cooldown_from_last_claim(
    last_claim_ms: Option<i64>,
    cooldown_ms: i64,
    now_ms: i64,
) -> CooldownInfo {
    assert!(cooldown_ms > 0, "Cooldown duration must be positive");
    let Some(last) = last_claim_ms else {
        return CooldownInfo::fresh();
    };
    let end = last.saturating_add(cooldown_ms);
    let remaining = (end - now_ms).max(0);
    CooldownInfo {
        can_claim: remaining == 0,
        remaining_ms: remaining as u64,
        next_claim_at: (remaining > 0).then(|| datetime_from_ms(end)),
        last_claim_at: Some(datetime_from_ms(last)),
    }
}

pub fn contribution_from_raw(raw: u128, decimals: u32) -> ContributionInfo {
    let total = tiers::to_human_units(raw, decimals);
    let tier = Tier::from_total(total);
    ContributionInfo {
        level: tier.level(),
        level_name: tier.name(),
        total_donated: total,
        total_donated_raw: raw.to_string(),
        next_level_requirement: tiers::next_requirement(total),
    }
}

pub fn merge_recent(mut records: Vec<DonationRecord>, limit: usize) -> Vec<DonationRecord> {
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    records.truncate(limit);
    records
}

fn datetime_from_ms(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use chrono::TimeZone;

    struct StubAdapter {
        id: String,
        fail: bool,
        donations: Vec<DonationRecord>,
    }

    impl StubAdapter {
        fn healthy(id: &str, donations: Vec<DonationRecord>) -> Self {
            Self {
                id: id.to_string(),
                fail: false,
                donations,
            }
        }

        fn failing(id: &str) -> Self {
            Self {
                id: id.to_string(),
                fail: true,
                donations: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl ChainAdapter for StubAdapter {
        fn chain_id(&self) -> &str {
            &self.id
        }

        fn family(&self) -> ChainFamily {
            ChainFamily::Evm
        }

        fn display_name(&self) -> &str {
            "Stub"
        }

        fn symbol(&self) -> &str {
            "STUB"
        }

        fn pool_reference(&self) -> &str {
            "0xpool"
        }

        async fn check_cooldown(&self, _address: &str) -> Result<CooldownInfo> {
            if self.fail {
                return Err(anyhow!("rpc unreachable"));
            }
            Ok(CooldownInfo::fresh())
        }

        async fn contribution(&self, _address: &str) -> Result<ContributionInfo> {
            if self.fail {
                return Err(anyhow!("rpc unreachable"));
            }
            Ok(contribution_from_raw(5_000_000_000, 9))
        }

        async fn pool_statistics(&self) -> Result<PoolStatistics> {
            if self.fail {
                return Err(anyhow!("rpc unreachable"));
            }
            Ok(PoolStatistics {
                current_balance: 12.0,
                total_donations: 20.0,
                total_claimed: 8.0,
                faucet_amount: 0.1,
                available_claims: 120,
                pool_reference: "0xpool".to_string(),
            })
        }

        async fn recent_donations(&self, limit: usize) -> Result<Vec<DonationRecord>> {
            if self.fail {
                return Err(anyhow!("rpc unreachable"));
            }
            Ok(self.donations.iter().take(limit).cloned().collect())
        }

        async fn probe(&self) -> Result<serde_json::Value> {
            if self.fail {
                return Err(anyhow!("rpc unreachable"));
            }
            Ok(serde_json::json!({"block_number": 100}))
        }
    }

    fn donation(chain: &str, donor: &str, secs: i64) -> DonationRecord {
        DonationRecord {
            chain: chain.to_string(),
            donor: donor.to_string(),
            amount: 1.0,
            message: String::new(),
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            tx_hash: format!("0x{donor}{secs}"),
        }
    }

    fn manager_with(adapters: Vec<Box<dyn ChainAdapter>>) -> ChainManager {
        ChainManager::from_adapters(adapters, BTreeMap::new()).expect("registry builds")
    }

    #[test]
    fn cooldown_formula() {
        let fresh = cooldown_from_last_claim(None, 86_400_000, 1_000);
        assert!(fresh.can_claim);
        assert_eq!(fresh.remaining_ms, 0);

        let halfway = cooldown_from_last_claim(Some(0), 86_400_000, 43_200_000);
        assert!(!halfway.can_claim);
        assert_eq!(halfway.remaining_ms, 43_200_000);
        assert!(halfway.next_claim_at.is_some());

        let elapsed = cooldown_from_last_claim(Some(0), 86_400_000, 86_400_001);
        assert!(elapsed.can_claim);
        assert_eq!(elapsed.remaining_ms, 0);
        assert!(elapsed.next_claim_at.is_none());
    }

    #[test]
    fn merge_orders_newest_first() {
        let merged = merge_recent(
            vec![
                donation("a", "x", 10),
                donation("b", "y", 30),
                donation("a", "z", 20),
            ],
            2,
        );
        assert_eq!(merged.len(), 2);
        assert!(merged[0].timestamp >= merged[1].timestamp);
        assert_eq!(merged[0].donor, "y");
        assert_eq!(merged[1].donor, "z");
    }

    #[tokio::test]
    async fn failing_adapter_degrades_to_defaults() {
        let manager = manager_with(vec![
            Box::new(StubAdapter::healthy("alpha", vec![donation("alpha", "d1", 5)])),
            Box::new(StubAdapter::failing("beta")),
        ]);

        let cooldowns = manager.multi_cooldown("0xabc").await;
        assert_eq!(cooldowns.len(), 2);
        assert!(cooldowns["alpha"].can_claim);
        assert!(!cooldowns["beta"].can_claim);
        assert_eq!(cooldowns["beta"].remaining_ms, DEGRADED_COOLDOWN_MS);

        let contributions = manager.multi_contribution("0xabc").await;
        assert_eq!(contributions["beta"].level, 0);
        assert_eq!(contributions["beta"].level_name, "None");
        assert_eq!(contributions["alpha"].level, 3);
    }

    #[tokio::test]
    async fn aggregate_activity_survives_partial_failure() {
        let manager = manager_with(vec![
            Box::new(StubAdapter::healthy(
                "alpha",
                vec![donation("alpha", "d1", 5), donation("alpha", "d2", 50)],
            )),
            Box::new(StubAdapter::failing("beta")),
        ]);

        let activity = manager.recent_activity(10).await;
        assert_eq!(activity.len(), 2);
        assert_eq!(activity[0].donor, "d2");
    }

    #[tokio::test]
    async fn statistics_flag_degradation() {
        let manager = manager_with(vec![Box::new(StubAdapter::failing("beta"))]);
        let stats = manager.chain_statistics("beta").await.expect("registered");
        assert!(stats.degraded);
        assert_eq!(stats.statistics.available_claims, 0);
        assert!(manager.chain_statistics("unknown").await.is_none());
    }

    #[tokio::test]
    async fn health_check_reports_both_sides() {
        let manager = manager_with(vec![
            Box::new(StubAdapter::healthy("alpha", Vec::new())),
            Box::new(StubAdapter::failing("beta")),
        ]);
        let health = manager.health_check().await;
        assert_eq!(health["alpha"].status, "healthy");
        assert_eq!(health["beta"].status, "unhealthy");
        assert!(health["beta"].error.is_some());
    }
}
