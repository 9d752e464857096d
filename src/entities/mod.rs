//! Entity module - Contains all SeaORM entity definitions for the database.
//! Each entity has a Model struct for data and an Entity struct for operations.
//! Collections (income rules, inventories, favorites) are JSON text columns.

pub mod economy_settings;
pub mod economy_user;
pub mod music_guild;
pub mod music_user;
pub mod shop_item;

// Re-export specific types to avoid conflicts
pub use economy_settings::{
    Column as EconomySettingsColumn, Entity as EconomySettings, Model as EconomySettingsModel,
};
pub use economy_user::{
    Column as EconomyUserColumn, Entity as EconomyUser, Model as EconomyUserModel,
};
pub use music_guild::{Column as MusicGuildColumn, Entity as MusicGuild, Model as MusicGuildModel};
pub use music_user::{Column as MusicUserColumn, Entity as MusicUser, Model as MusicUserModel};
pub use shop_item::{Column as ShopItemColumn, Entity as ShopItem, Model as ShopItemModel};
