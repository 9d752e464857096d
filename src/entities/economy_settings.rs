//! Economy settings entity - one row per guild with the economy configured.
//!
//! The `enabled` flag toggles the economy without discarding configuration or
//! income rules. Income rules are stored as a JSON object keyed by role id.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Per-guild economy configuration
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "economy_settings")]
pub struct Model {
    /// Discord guild ID
    #[sea_orm(primary_key, auto_increment = false)]
    pub guild_id: String,
    /// Whether economy commands are currently available in the guild
    pub enabled: bool,
    /// Wallet balance given to accounts on first reference
    pub start_balance: i64,
    /// Upper bound for wallet + bank
    pub max_balance: i64,
    /// Chance in percent that `/work` pays out
    pub win_rate: i32,
    /// Seconds between two `/work` invocations
    pub work_cooldown: i64,
    /// Lower bound of a `/work` payout
    pub work_min: i64,
    /// Upper bound of a `/work` payout
    pub work_max: i64,
    /// Seconds between two `/coinflip` invocations
    pub coinflip_cooldown: i64,
    /// JSON-encoded map of role id to income rule
    #[sea_orm(column_type = "Text")]
    pub income_roles: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
