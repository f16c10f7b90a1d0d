use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::future::Cache;
use sea_orm::DatabaseConnection;
use serde_json::Value;

use crate::auth::AuthKeys;
use crate::chains::{ChainManager, ChainStatistics, ContributionInfo};
use crate::config::CacheConfig;
use crate::events::EventBus;
use crate::faucet::FaucetService;

#[derive(Clone)]
pub struct AppState {
    pub database: DatabaseConnection,
    pub cache: Arc<ApiCache>,
    pub chains: Arc<ChainManager>,
    pub faucet: Arc<FaucetService>,
    pub auth: Arc<AuthKeys>,
    pub events: EventBus,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        database: DatabaseConnection,
        cache: Arc<ApiCache>,
        chains: Arc<ChainManager>,
        auth: Arc<AuthKeys>,
        events: EventBus,
    ) -> Self {
        assert!(
            !chains.supported_chains().is_empty(),
            "Chain registry must not be empty"
        );
        let faucet = Arc::new(FaucetService::new(database.clone(), Arc::clone(&chains)));
        Self {
            database,
            cache,
            chains,
            faucet,
            auth,
            events,
            start_time: Instant::now(),
        }
    }
}

pub struct ApiCache {
    pub chain_statistics: Cache<String, Arc<ChainStatistics>>,
    pub contributions: Cache<String, Arc<ContributionInfo>>,
    pub leaderboards: Cache<String, Value>,
}

impl ApiCache {
    pub fn new(config: &CacheConfig) -> Self {
        assert!(
            config.statistics_max_capacity >= 10,
            "Statistics cache capacity threshold"
        );
        assert!(
            config.contributions_max_capacity >= 100,
            "Contribution cache capacity threshold"
        );

        let chain_statistics = Cache::builder()
            .max_capacity(config.statistics_max_capacity)
            .time_to_live(Duration::from_secs(config.statistics_ttl_seconds))
            .time_to_idle(Duration::from_secs(config.statistics_ttl_seconds / 2 + 1))
            .build();

        let contributions = Cache::builder()
            .max_capacity(config.contributions_max_capacity)
            .time_to_live(Duration::from_secs(config.contributions_ttl_seconds))
            .time_to_idle(Duration::from_secs(config.contributions_ttl_seconds / 2 + 1))
            .build();

        let leaderboards = Cache::builder()
            .max_capacity(config.leaderboards_max_capacity)
            .time_to_live(Duration::from_secs(config.leaderboards_ttl_seconds))
            .time_to_idle(Duration::from_secs(config.leaderboards_ttl_seconds / 2 + 1))
            .build();

        Self {
            chain_statistics,
            contributions,
            leaderboards,
        }
    }
}
