//! Shop item entity - items a guild sells for wallet currency.
//!
//! Items can require a role to be bought and can grant a role on purchase.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Shop item database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "shop_items")]
pub struct Model {
    /// Generated opaque identifier
    #[sea_orm(primary_key, auto_increment = false)]
    pub item_id: String,
    /// Discord guild ID the item belongs to
    pub guild_id: String,
    /// Display name, unique within the guild
    pub name: String,
    pub description: String,
    /// Price in wallet currency, always positive
    pub price: i64,
    /// Message shown to the buyer after a purchase
    pub reply_message: Option<String>,
    /// Role a member must hold to buy the item
    pub required_role: Option<String>,
    /// Role granted to the buyer
    pub given_role: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
