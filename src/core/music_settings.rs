//! Per-guild music preferences and the per-user Spotify link.

use crate::{
    core::{
        economy::key,
        favorites::{find_music_user, get_music_user},
    },
    entities::{MusicGuild, music_guild, music_user},
    errors::Result,
};
use sea_orm::{Set, prelude::*};

/// Whether automatic alerts are posted in a guild. Defaults to `true`.
pub async fn alerts_enabled(db: &DatabaseConnection, guild_id: u64) -> Result<bool> {
    Ok(MusicGuild::find_by_id(key(guild_id))
        .one(db)
        .await?
        .is_none_or(|guild| guild.alerts_enabled))
}

/// Stores the alert preference of a guild.
pub async fn set_alerts(db: &DatabaseConnection, guild_id: u64, enabled: bool) -> Result<()> {
    match MusicGuild::find_by_id(key(guild_id)).one(db).await? {
        Some(existing) => {
            let mut active: music_guild::ActiveModel = existing.into();
            active.alerts_enabled = Set(enabled);
            active.update(db).await?;
        }
        None => {
            let guild = music_guild::ActiveModel {
                guild_id: Set(key(guild_id)),
                alerts_enabled: Set(enabled),
            };
            guild.insert(db).await?;
        }
    }
    Ok(())
}

/// Linked Spotify user id, if any.
pub async fn spotify_user_id(db: &DatabaseConnection, user_id: u64) -> Result<Option<String>> {
    Ok(find_music_user(db, user_id)
        .await?
        .and_then(|profile| profile.spotify_user_id))
}

/// Links or unlinks (`None`) a Spotify account.
pub async fn set_spotify_user_id(
    db: &DatabaseConnection,
    user_id: u64,
    spotify_user_id: Option<String>,
) -> Result<()> {
    let profile = get_music_user(db, user_id).await?;
    let mut active: music_user::ActiveModel = profile.into();
    active.spotify_user_id = Set(spotify_user_id);
    active.update(db).await?;
    Ok(())
}
