//! Shop business logic - items, purchases and inventories.

use crate::{
    core::economy::{get_account, key, require_settings},
    entities::{EconomyUser, ShopItem, economy_user, shop_item},
    errors::{Error, Result},
    platform::MemberDirectory,
};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use tracing::{info, warn};

/// Most items a guild can sell.
pub const MAX_SHOP_ITEMS: usize = 25;
/// Most distinct item ids an inventory can hold.
pub const MAX_INVENTORY_ITEMS: usize = 50;

/// Decodes the JSON inventory column.
pub fn decode_items(raw: &str) -> Result<Vec<String>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw).map_err(Into::into)
}

pub fn encode_items(items: &[String]) -> Result<String> {
    serde_json::to_string(items).map_err(Into::into)
}

fn parse_role(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|r| r.parse().ok())
}

/// Fields of a new shop item.
#[derive(Debug, Clone, Default)]
pub struct NewItem {
    pub name: String,
    pub description: String,
    pub price: i64,
    pub reply_message: Option<String>,
    pub required_role: Option<u64>,
    pub given_role: Option<u64>,
}

/// Partial edit of an item. The nested options clear a field when set to `Some(None)`.
#[derive(Debug, Clone, Default)]
pub struct ItemPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub reply_message: Option<Option<String>>,
    pub required_role: Option<Option<u64>>,
    pub given_role: Option<Option<u64>>,
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() || name.chars().count() > 100 {
        return Err(Error::InvalidInput {
            message: "Item names must be between 1 and 100 characters".to_string(),
        });
    }
    Ok(())
}

fn validate_price(price: i64) -> Result<()> {
    if price <= 0 {
        return Err(Error::InvalidAmount { amount: price });
    }
    Ok(())
}

/// Finds an item by its exact name.
pub async fn get_item_by_name<C>(db: &C, guild_id: u64, name: &str) -> Result<Option<shop_item::Model>>
where
    C: ConnectionTrait,
{
    ShopItem::find()
        .filter(shop_item::Column::GuildId.eq(key(guild_id)))
        .filter(shop_item::Column::Name.eq(name))
        .one(db)
        .await
        .map_err(Into::into)
}

async fn require_item<C>(db: &C, guild_id: u64, name: &str) -> Result<shop_item::Model>
where
    C: ConnectionTrait,
{
    get_item_by_name(db, guild_id, name)
        .await?
        .ok_or_else(|| Error::ItemNotFound {
            name: name.to_string(),
        })
}

/// All items of a guild, cheapest first.
pub async fn list_items(db: &DatabaseConnection, guild_id: u64) -> Result<Vec<shop_item::Model>> {
    require_settings(db, guild_id).await?;
    ShopItem::find()
        .filter(shop_item::Column::GuildId.eq(key(guild_id)))
        .order_by_asc(shop_item::Column::Price)
        .order_by_asc(shop_item::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Adds an item to the guild shop.
pub async fn create_item(
    db: &DatabaseConnection,
    guild_id: u64,
    item: NewItem,
) -> Result<shop_item::Model> {
    require_settings(db, guild_id).await?;
    validate_name(&item.name)?;
    validate_price(item.price)?;

    if get_item_by_name(db, guild_id, &item.name).await?.is_some() {
        return Err(Error::ItemExists { name: item.name });
    }

    let count = ShopItem::find()
        .filter(shop_item::Column::GuildId.eq(key(guild_id)))
        .count(db)
        .await?;
    if count >= MAX_SHOP_ITEMS as u64 {
        return Err(Error::LimitReached {
            kind: "shop items",
            cap: MAX_SHOP_ITEMS,
        });
    }

    let model = shop_item::ActiveModel {
        item_id: Set(uuid::Uuid::new_v4().to_string()),
        guild_id: Set(key(guild_id)),
        name: Set(item.name),
        description: Set(item.description),
        price: Set(item.price),
        reply_message: Set(item.reply_message),
        required_role: Set(item.required_role.map(key)),
        given_role: Set(item.given_role.map(key)),
    };

    let created = model.insert(db).await?;
    info!(guild_id, item = %created.name, "Created shop item");
    Ok(created)
}

/// Edits the item currently named `name`.
pub async fn edit_item(
    db: &DatabaseConnection,
    guild_id: u64,
    name: &str,
    patch: ItemPatch,
) -> Result<shop_item::Model> {
    require_settings(db, guild_id).await?;
    let item = require_item(db, guild_id, name).await?;
    let mut active: shop_item::ActiveModel = item.into();

    if let Some(new_name) = patch.name {
        validate_name(&new_name)?;
        if new_name != name && get_item_by_name(db, guild_id, &new_name).await?.is_some() {
            return Err(Error::ItemExists { name: new_name });
        }
        active.name = Set(new_name);
    }
    if let Some(description) = patch.description {
        active.description = Set(description);
    }
    if let Some(price) = patch.price {
        validate_price(price)?;
        active.price = Set(price);
    }
    if let Some(reply) = patch.reply_message {
        active.reply_message = Set(reply);
    }
    if let Some(role) = patch.required_role {
        active.required_role = Set(role.map(key));
    }
    if let Some(role) = patch.given_role {
        active.given_role = Set(role.map(key));
    }

    active.update(db).await.map_err(Into::into)
}

/// Deletes an item and strips its id from every inventory of the guild.
pub async fn delete_item(db: &DatabaseConnection, guild_id: u64, name: &str) -> Result<()> {
    require_settings(db, guild_id).await?;
    let item = require_item(db, guild_id, name).await?;

    let txn = db.begin().await?;
    let accounts = EconomyUser::find()
        .filter(economy_user::Column::GuildId.eq(key(guild_id)))
        .all(&txn)
        .await?;

    for account in accounts {
        let items = decode_items(&account.items)?;
        if !items.contains(&item.item_id) {
            continue;
        }
        let kept: Vec<String> = items.into_iter().filter(|id| id != &item.item_id).collect();
        let mut active: economy_user::ActiveModel = account.into();
        active.items = Set(encode_items(&kept)?);
        active.update(&txn).await?;
    }

    ShopItem::delete_by_id(item.item_id.clone()).exec(&txn).await?;
    txn.commit().await?;

    info!(guild_id, item = %item.name, "Deleted shop item");
    Ok(())
}

/// Outcome of a successful purchase.
#[derive(Debug, Clone)]
pub struct Purchase {
    pub item: shop_item::Model,
    pub account: economy_user::Model,
    /// Whether the item's role was newly granted
    pub role_granted: bool,
}

/// Buys one unit of an item.
///
/// The purchase is committed before the granted role is applied; a failure to
/// add the role is logged and does not undo the purchase.
pub async fn buy_item(
    db: &DatabaseConnection,
    members: &dyn MemberDirectory,
    guild_id: u64,
    user_id: u64,
    name: &str,
) -> Result<Purchase> {
    let settings = require_settings(db, guild_id).await?;
    let item = require_item(db, guild_id, name).await?;

    let needs_roles = item.required_role.is_some() || item.given_role.is_some();
    let roles = if needs_roles {
        members.member_roles(guild_id, user_id).await?
    } else {
        Vec::new()
    };

    if let Some(required) = parse_role(item.required_role.as_deref()) {
        if !roles.contains(&required) {
            return Err(Error::MissingRole { role_id: required });
        }
    }

    let account = get_account(db, &settings, user_id).await?;
    if account.wallet < item.price {
        return Err(Error::InsufficientFunds {
            current: account.wallet,
            required: item.price,
        });
    }

    let mut items = decode_items(&account.items)?;
    if !items.contains(&item.item_id) {
        let mut distinct = items.clone();
        distinct.sort_unstable();
        distinct.dedup();
        if distinct.len() >= MAX_INVENTORY_ITEMS {
            return Err(Error::LimitReached {
                kind: "items",
                cap: MAX_INVENTORY_ITEMS,
            });
        }
    }
    items.push(item.item_id.clone());

    let wallet = account.wallet - item.price;
    let mut active: economy_user::ActiveModel = account.into();
    active.wallet = Set(wallet);
    active.items = Set(encode_items(&items)?);
    let account = active.update(db).await?;

    let mut role_granted = false;
    if let Some(given) = parse_role(item.given_role.as_deref()) {
        if !roles.contains(&given) {
            match members.add_role(guild_id, user_id, given).await {
                Ok(()) => role_granted = true,
                Err(e) => warn!(guild_id, user_id, role_id = given, "Failed to grant item role: {e}"),
            }
        }
    }

    info!(guild_id, user_id, item = %item.name, "Item purchased");
    Ok(Purchase {
        item,
        account,
        role_granted,
    })
}

/// One line of an inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryEntry {
    pub item: shop_item::Model,
    pub quantity: usize,
}

/// Resolves a member's inventory in acquisition order, skipping deleted items.
pub async fn inventory(
    db: &DatabaseConnection,
    guild_id: u64,
    user_id: u64,
) -> Result<Vec<InventoryEntry>> {
    let settings = require_settings(db, guild_id).await?;
    let account = get_account(db, &settings, user_id).await?;
    let ids = decode_items(&account.items)?;

    let mut entries: Vec<InventoryEntry> = Vec::new();
    for id in ids {
        if let Some(entry) = entries.iter_mut().find(|e| e.item.item_id == id) {
            entry.quantity += 1;
            continue;
        }
        if let Some(item) = ShopItem::find_by_id(id).one(db).await? {
            entries.push(InventoryEntry { item, quantity: 1 });
        }
    }
    Ok(entries)
}
