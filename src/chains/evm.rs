//! EVM-family adapter. Reads the AutoFaucetPool contract over JSON-RPC.

use std::collections::BTreeMap;

use alloy::primitives::{Address, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::Filter;
use alloy::sol;
use alloy_sol_types::SolEvent;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;

use crate::config::ChainEntry;
use crate::tiers::{self, Tier};

use super::{
    ChainAdapter, ChainFamily, ContributionInfo, CooldownInfo, DonationRecord, PoolStatistics,
    datetime_from_ms,
};

/// Donation events are scanned over the most recent blocks only.
const LOG_LOOKBACK_BLOCKS: u64 = 5_000;

sol! {
    #[sol(rpc)]
    interface IDonationPool {
        function canClaim(address user) external view returns (bool);
        function getCooldownRemaining(address user) external view returns (uint256);
        function getContributionLevel(address user) external view returns (uint8);
        function totalDonated(address user) external view returns (uint256);
        function getPoolStats() external view returns (uint256, uint256, uint256, uint256, uint256);
        function faucetAmount() external view returns (uint256);
        function lastClaim(address user) external view returns (uint256);

        event DonationReceived(address indexed donor, uint256 amount, string message);
        event FaucetClaimed(address indexed user, uint256 amount);
    }
}

pub struct EvmChain {
    chain_id: String,
    name: String,
    symbol: String,
    provider: DynProvider,
    pool: Option<IDonationPool::IDonationPoolInstance<DynProvider>>,
    pool_reference: String,
}

impl EvmChain {
    pub async fn connect(entry: &ChainEntry) -> Result<Self> {
        assert!(entry.family == ChainFamily::Evm, "Entry is not an EVM chain");
        let provider = ProviderBuilder::new()
            .connect(&entry.rpc_url)
            .await
            .with_context(|| format!("Failed to connect EVM provider for {}", entry.id))?
            .erased();

        let pool_address = entry
            .pool_address
            .as_deref()
            .map(|raw| {
                raw.parse::<Address>()
                    .with_context(|| format!("Invalid pool address for {}", entry.id))
            })
            .transpose()?;
        let pool = pool_address.map(|address| IDonationPool::new(address, provider.clone()));

        Ok(Self {
            chain_id: entry.id.clone(),
            name: entry.name.clone(),
            symbol: entry.symbol.clone(),
            provider,
            pool,
            pool_reference: entry.pool_address.clone().unwrap_or_default(),
        })
    }

    fn pool(&self) -> Result<&IDonationPool::IDonationPoolInstance<DynProvider>> {
        self.pool
            .as_ref()
            .ok_or_else(|| anyhow!("Donation pool not deployed on {}", self.chain_id))
    }

    async fn block_timestamp_ms(
        &self,
        number: Option<u64>,
        memo: &mut BTreeMap<u64, i64>,
    ) -> Result<i64> {
        let Some(number) = number else {
            return Ok(0);
        };
        if let Some(cached) = memo.get(&number) {
            return Ok(*cached);
        }
        let block = self
            .provider
            .get_block_by_number(number.into())
            .await
            .context("RPC call eth_getBlockByNumber failed")?;
        let timestamp_ms = block
            .map(|b| b.header.timestamp as i64 * 1_000)
            .unwrap_or(0);
        memo.insert(number, timestamp_ms);
        Ok(timestamp_ms)
    }
}

#[async_trait]
impl ChainAdapter for EvmChain {
    fn chain_id(&self) -> &str {
        &self.chain_id
    }

    fn family(&self) -> ChainFamily {
        ChainFamily::Evm
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn pool_reference(&self) -> &str {
        &self.pool_reference
    }

    async fn check_cooldown(&self, address: &str) -> Result<CooldownInfo> {
        let pool = self.pool()?;
        let user: Address = address.parse().context("Invalid EVM address")?;

        let (remaining, last_claim) = tokio::try_join!(
            async {
                pool.getCooldownRemaining(user)
                    .call()
                    .await
                    .context("getCooldownRemaining call failed")
            },
            async {
                pool.lastClaim(user)
                    .call()
                    .await
                    .context("lastClaim call failed")
            },
        )?;

        let remaining_ms = u256_to_u128(remaining).saturating_mul(1_000).min(i64::MAX as u128) as u64;
        let last_claim_ms = u256_to_u128(last_claim).saturating_mul(1_000).min(i64::MAX as u128) as i64;
        let now_ms = Utc::now().timestamp_millis();

        Ok(CooldownInfo {
            can_claim: remaining_ms == 0,
            remaining_ms,
            next_claim_at: (remaining_ms > 0)
                .then(|| datetime_from_ms(now_ms.saturating_add(remaining_ms as i64))),
            last_claim_at: (last_claim_ms > 0).then(|| datetime_from_ms(last_claim_ms)),
        })
    }

    async fn contribution(&self, address: &str) -> Result<ContributionInfo> {
        let pool = self.pool()?;
        let user: Address = address.parse().context("Invalid EVM address")?;

        let (level, total_wei) = tokio::try_join!(
            async {
                pool.getContributionLevel(user)
                    .call()
                    .await
                    .context("getContributionLevel call failed")
            },
            async {
                pool.totalDonated(user)
                    .call()
                    .await
                    .context("totalDonated call failed")
            },
        )?;

        // The contract is authoritative for the level; the next-tier gap is
        // derived from the total like everywhere else.
        let total = u256_to_human(total_wei, tiers::EVM_DECIMALS);
        let tier = Tier::from_level(level);
        Ok(ContributionInfo {
            level: tier.level(),
            level_name: tier.name(),
            total_donated: total,
            total_donated_raw: total_wei.to_string(),
            next_level_requirement: tiers::next_requirement(total),
        })
    }

    async fn pool_statistics(&self) -> Result<PoolStatistics> {
        let pool = self.pool()?;
        let (stats, faucet_amount) = tokio::try_join!(
            async { pool.getPoolStats().call().await.context("getPoolStats call failed") },
            async {
                pool.faucetAmount()
                    .call()
                    .await
                    .context("faucetAmount call failed")
            },
        )?;

        Ok(PoolStatistics {
            current_balance: u256_to_human(stats._0, tiers::EVM_DECIMALS),
            total_donations: u256_to_human(stats._1, tiers::EVM_DECIMALS),
            total_claimed: u256_to_human(stats._2, tiers::EVM_DECIMALS),
            faucet_amount: u256_to_human(faucet_amount, tiers::EVM_DECIMALS),
            available_claims: u256_to_u128(stats._4).min(u64::MAX as u128) as u64,
            pool_reference: self.pool_reference.clone(),
        })
    }

    async fn recent_donations(&self, limit: usize) -> Result<Vec<DonationRecord>> {
        let pool = self.pool()?;
        let latest = self
            .provider
            .get_block_number()
            .await
            .context("RPC call eth_blockNumber failed")?;
        let filter = Filter::new()
            .address(*pool.address())
            .event_signature(IDonationPool::DonationReceived::SIGNATURE_HASH)
            .from_block(latest.saturating_sub(LOG_LOOKBACK_BLOCKS));
        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .context("RPC call eth_getLogs failed")?;
        assert!(
            logs.len() <= 100_000,
            "Log batch exceeded defensive limit"
        );

        let mut block_timestamps = BTreeMap::new();
        let mut records = Vec::with_capacity(limit.min(logs.len()));
        // Logs arrive oldest first; keep the newest `limit`, newest first.
        for log in logs.iter().rev().take(limit) {
            let decoded = log
                .log_decode::<IDonationPool::DonationReceived>()
                .context("Failed to decode DonationReceived log")?;
            let event = decoded.inner.data;
            let timestamp_ms = match log.block_timestamp {
                Some(seconds) => seconds as i64 * 1_000,
                None => {
                    self.block_timestamp_ms(log.block_number, &mut block_timestamps)
                        .await?
                }
            };
            records.push(DonationRecord {
                chain: self.chain_id.clone(),
                donor: event.donor.to_string(),
                amount: u256_to_human(event.amount, tiers::EVM_DECIMALS),
                message: event.message,
                timestamp: datetime_from_ms(timestamp_ms),
                tx_hash: log
                    .transaction_hash
                    .map(|hash| hash.to_string())
                    .unwrap_or_default(),
            });
        }
        Ok(records)
    }

    async fn probe(&self) -> Result<serde_json::Value> {
        let (block_number, chain_id) = tokio::try_join!(
            async {
                self.provider
                    .get_block_number()
                    .await
                    .context("RPC call eth_blockNumber failed")
            },
            async {
                self.provider
                    .get_chain_id()
                    .await
                    .context("RPC call eth_chainId failed")
            },
        )?;
        Ok(serde_json::json!({
            "block_number": block_number,
            "network_chain_id": chain_id,
        }))
    }
}

fn u256_to_u128(value: U256) -> u128 {
    u128::try_from(value).unwrap_or(u128::MAX)
}

/// Lossy conversion to human units; precision past f64 is irrelevant for
/// tier thresholds and display.
fn u256_to_human(value: U256, decimals: u32) -> f64 {
    let raw = value.to_string().parse::<f64>().unwrap_or(f64::MAX);
    raw / 10f64.powi(decimals as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wei_conversion() {
        assert_eq!(u256_to_human(U256::ZERO, tiers::EVM_DECIMALS), 0.0);
        assert_eq!(
            u256_to_human(U256::from(10u64).pow(U256::from(18u64)), tiers::EVM_DECIMALS),
            1.0
        );
        let half_eth = U256::from(500_000_000_000_000_000u128);
        assert_eq!(u256_to_human(half_eth, tiers::EVM_DECIMALS), 0.5);
    }

    #[test]
    fn u128_clamp() {
        assert_eq!(u256_to_u128(U256::from(42u64)), 42);
        assert_eq!(u256_to_u128(U256::MAX), u128::MAX);
    }
}
