//! Economy account entity - wallet, bank and inventory per guild member.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Economy account database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "economy_users")]
pub struct Model {
    /// Discord guild ID
    #[sea_orm(primary_key, auto_increment = false)]
    pub guild_id: String,
    /// Discord user ID
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,
    /// Spendable balance
    pub wallet: i64,
    /// Saved balance
    pub bank: i64,
    /// JSON-encoded list of owned shop item ids (a multiset, order preserved)
    #[sea_orm(column_type = "Text")]
    pub items: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
