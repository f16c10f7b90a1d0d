//! User entity, created on first successful wallet login.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Wallet address, stored lowercased and unique
    #[sea_orm(column_type = "String(StringLen::N(128))", unique)]
    pub address: String,
    #[sea_orm(column_type = "String(StringLen::N(255))", nullable)]
    pub email: Option<String>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::faucet_request::Entity")]
    FaucetRequest,
}

impl Related<super::faucet_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FaucetRequest.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
