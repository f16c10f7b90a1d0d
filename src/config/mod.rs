use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, ConfigError, File, FileFormat};
use serde::Deserialize;

use crate::chains::ChainFamily;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub cache: CacheConfig,
    pub chains: Vec<ChainEntry>,
}

impl ApiConfig {
    pub fn load() -> Result<Self> {
        let configured_path =
            std::env::var("FAUCETHUB_API_CONFIG").unwrap_or_else(|_| "config/api.toml".to_string());
        assert!(
            !configured_path.is_empty(),
            "Configuration path must be non-empty"
        );
        assert!(
            configured_path.len() < 4096,
            "Configuration path length exceeds hard limit"
        );

        let mut builder = Config::builder()
            .add_source(File::new(&configured_path, FileFormat::Toml).required(true));

        if let Ok(env_override) = std::env::var("FAUCETHUB_API_ENV") {
            if !env_override.is_empty() {
                let env_file = format!("config/api.{}.toml", env_override);
                if Path::new(&env_file).exists() {
                    builder = builder.add_source(File::new(&env_file, FileFormat::Toml));
                }
            }
        }

        let settings = builder
            .build()
            .map_err(|err| map_config_error(err, &configured_path))?;
        let config: Self = settings
            .try_deserialize()
            .context("Failed to deserialize API configuration")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        assert!(
            !self.database.url.is_empty(),
            "Database URL must be specified"
        );
        assert!(
            self.server.port > 0,
            "Server port must be greater than zero"
        );
        assert!(!self.chains.is_empty(), "At least one chain must be configured");
        assert!(
            self.chains.len() <= 64,
            "Chain registry exceeds defensive limit"
        );
        for entry in &self.chains {
            entry.ensure_bounds()?;
        }
        self.auth.ensure_bounds()?;
        self.cache.ensure_bounds()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Option<IpAddr>,
    pub port: u16,
}

impl ServerConfig {
    pub fn address(&self) -> SocketAddr {
        let host = self.host.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(self.port != 0, "HTTP port cannot be zero");
        assert!(self.port < 65535, "HTTP port must be below 65535");
        SocketAddr::new(host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub token_secret: String,
    #[serde(default = "AuthConfig::default_token_ttl")]
    pub token_ttl_seconds: u64,
    #[serde(default = "AuthConfig::default_nonce_ttl")]
    pub nonce_ttl_seconds: u64,
}

impl AuthConfig {
    fn ensure_bounds(&self) -> Result<()> {
        assert!(
            self.token_secret.len() >= 32,
            "Token secret must be at least 32 bytes"
        );
        assert!(
            self.token_ttl_seconds >= 60,
            "Token TTL must be at least one minute"
        );
        assert!(
            self.token_ttl_seconds <= 604_800,
            "Token TTL cannot exceed one week"
        );
        assert!(
            self.nonce_ttl_seconds >= 30,
            "Nonce TTL must be at least 30 seconds"
        );
        assert!(
            self.nonce_ttl_seconds <= 3_600,
            "Nonce TTL cannot exceed one hour"
        );
        Ok(())
    }

    const fn default_token_ttl() -> u64 {
        86_400
    }

    const fn default_nonce_ttl() -> u64 {
        300
    }
}

/// One registered chain. The backing adapter is selected by `family`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainEntry {
    pub id: String,
    pub family: ChainFamily,
    pub name: String,
    pub symbol: String,
    pub rpc_url: String,
    /// Official faucet page users are redirected to
    pub faucet_url: String,
    /// Donation pool contract address (EVM) or shared pool object id (Sui)
    pub pool_address: Option<String>,
    /// Move package id publishing the pool events (Sui only)
    pub package_id: Option<String>,
    pub cooldown_hours: i32,
    /// Maximum amount per claim, human units
    pub max_amount: String,
    /// Minimum pool balance, human units
    pub min_balance: String,
    pub request_timeout_ms: Option<u64>,
}

impl ChainEntry {
    pub fn request_timeout(&self) -> Duration {
        let millis = self.request_timeout_ms.unwrap_or(3_000);
        assert!(millis >= 100, "RPC timeout must be at least 100ms");
        assert!(millis <= 60_000, "RPC timeout cannot exceed 60 seconds");
        Duration::from_millis(millis)
    }

    fn ensure_bounds(&self) -> Result<()> {
        assert!(!self.id.is_empty(), "Chain id must be non-empty");
        assert!(self.id.len() <= 32, "Chain id exceeds 32 character limit");
        assert!(!self.rpc_url.is_empty(), "Chain RPC URL must be specified");
        assert!(
            self.cooldown_hours > 0,
            "Cooldown hours must be positive"
        );
        assert!(
            self.cooldown_hours <= 168,
            "Cooldown cannot exceed one week"
        );
        if self.family == ChainFamily::Sui {
            assert!(
                self.package_id.is_some() || self.pool_address.is_none(),
                "Sui chains with a pool object also need a package id"
            );
        }
        let _ = self.request_timeout();
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub statistics_max_capacity: u64,
    pub statistics_ttl_seconds: u64,
    pub contributions_max_capacity: u64,
    pub contributions_ttl_seconds: u64,
    pub leaderboards_max_capacity: u64,
    pub leaderboards_ttl_seconds: u64,
}

impl CacheConfig {
    fn ensure_bounds(&self) -> Result<()> {
        assert!(
            self.statistics_max_capacity >= 10,
            "Statistics cache capacity must be at least 10"
        );
        assert!(
            self.contributions_max_capacity >= 100,
            "Contribution cache capacity must be at least 100"
        );
        assert!(
            self.statistics_ttl_seconds <= 3_600,
            "Statistics cache TTL cannot exceed one hour"
        );
        assert!(
            self.contributions_ttl_seconds <= 3_600,
            "Contribution cache TTL cannot exceed one hour"
        );
        assert!(
            self.leaderboards_ttl_seconds <= 86_400,
            "Leaderboard cache TTL cannot exceed one day"
        );
        Ok(())
    }
}

fn map_config_error(err: ConfigError, path: &str) -> ConfigError {
    match err {
        ConfigError::NotFound(_) => ConfigError::NotFound(path.to_string()),
        other => other,
    }
}
