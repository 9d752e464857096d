//! Music user entity - per-user favorites and linked Spotify account.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "music_users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,
    /// JSON-encoded list of favorite songs, at most 25 entries
    #[sea_orm(column_type = "Text")]
    pub favorite_songs: String,
    /// Spotify user id, the only thing kept from account linking
    pub spotify_user_id: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
