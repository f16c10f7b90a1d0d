//! Per-chain faucet configuration, synced from the config file at boot.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "faucet_configs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "String(StringLen::N(32))")]
    pub chain: String,
    #[sea_orm(column_type = "String(StringLen::N(64))")]
    pub name: String,
    /// Native token symbol
    #[sea_orm(column_type = "String(StringLen::N(16))")]
    pub token: String,
    #[sea_orm(column_type = "String(StringLen::N(255))")]
    pub rpc_url: String,
    /// Official faucet page the user is redirected to
    #[sea_orm(column_type = "String(StringLen::N(255))")]
    pub faucet_url: String,
    pub cooldown_hours: i32,
    /// Maximum amount per claim, human units
    #[sea_orm(column_type = "String(StringLen::N(32))")]
    pub max_amount: String,
    /// Minimum pool balance before claims are discouraged
    #[sea_orm(column_type = "String(StringLen::N(32))")]
    pub min_balance: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
