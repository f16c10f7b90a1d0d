//! Faucet request history. Append-only; the newest row with a future
//! `cooldown_until` blocks new requests for that (user, chain) pair.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "faucet_requests")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: i64,
    #[sea_orm(column_type = "String(StringLen::N(32))")]
    pub chain: String,
    #[sea_orm(column_type = "String(StringLen::N(16))")]
    pub token: String,
    /// Claim amount, human units
    #[sea_orm(column_type = "String(StringLen::N(32))")]
    pub amount: String,
    pub source: RequestSource,
    pub status: RequestStatus,
    pub requested_at: DateTimeWithTimeZone,
    pub completed_at: Option<DateTimeWithTimeZone>,
    pub cooldown_until: DateTimeWithTimeZone,
    #[sea_orm(column_type = "String(StringLen::N(128))", nullable)]
    pub tx_hash: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestSource {
    #[sea_orm(string_value = "OFFICIAL_FAUCET")]
    OfficialFaucet,
    #[sea_orm(string_value = "COMMUNITY_POOL")]
    CommunityPool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "PROCESSING")]
    Processing,
    #[sea_orm(string_value = "SUCCESS")]
    Success,
    #[sea_orm(string_value = "FAILED")]
    Failed,
}

impl RequestStatus {
    /// Position in the one-way lifecycle. Transitions may only move forward;
    /// SUCCESS and FAILED are terminal.
    pub fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Processing => 1,
            Self::Success | Self::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_lifecycle_is_one_way() {
        assert!(RequestStatus::Pending.rank() < RequestStatus::Processing.rank());
        assert!(RequestStatus::Processing.rank() < RequestStatus::Success.rank());
        assert_eq!(RequestStatus::Success.rank(), RequestStatus::Failed.rank());
        assert!(RequestStatus::Success.is_terminal());
        assert!(RequestStatus::Failed.is_terminal());
        assert!(!RequestStatus::Processing.is_terminal());
    }
}
