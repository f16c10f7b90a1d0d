//! Donation pool mirror. The chain is the source of truth; these rows cache it.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "donation_pools")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "String(StringLen::N(32))")]
    pub chain: String,
    #[sea_orm(column_type = "String(StringLen::N(16))")]
    pub token: String,
    /// Total ever donated, human units
    #[sea_orm(column_type = "String(StringLen::N(32))")]
    pub total_amount: String,
    #[sea_orm(column_type = "String(StringLen::N(32))")]
    pub available: String,
    #[sea_orm(column_type = "String(StringLen::N(32))")]
    pub distributed: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
