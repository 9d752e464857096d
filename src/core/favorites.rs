//! Favorite songs - a bounded, ordered list per user.

use crate::{
    core::economy::key,
    entities::{MusicUser, music_user},
    errors::{Error, Result},
};
use sea_orm::{Set, prelude::*};
use serde::{Deserialize, Serialize};

/// Most favorites a user can keep.
pub const MAX_FAVORITES: usize = 25;

/// A saved song, enough to resolve it again through the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteSong {
    pub title: String,
    pub url: String,
    pub author: String,
    #[serde(default)]
    pub artwork_url: Option<String>,
    /// Length in milliseconds
    pub length: u64,
}

pub fn decode_favorites(raw: &str) -> Result<Vec<FavoriteSong>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw).map_err(Into::into)
}

/// Loads the music profile of a user without creating it.
pub async fn find_music_user<C>(db: &C, user_id: u64) -> Result<Option<music_user::Model>>
where
    C: ConnectionTrait,
{
    MusicUser::find_by_id(key(user_id))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Loads the music profile of a user, creating an empty one if needed.
pub async fn get_music_user(db: &DatabaseConnection, user_id: u64) -> Result<music_user::Model> {
    if let Some(existing) = find_music_user(db, user_id).await? {
        return Ok(existing);
    }

    let profile = music_user::ActiveModel {
        user_id: Set(key(user_id)),
        favorite_songs: Set("[]".to_string()),
        spotify_user_id: Set(None),
    };
    match profile.insert(db).await {
        Ok(created) => Ok(created),
        Err(e) => find_music_user(db, user_id)
            .await?
            .ok_or_else(|| Error::Database(e)),
    }
}

async fn save_favorites(
    db: &DatabaseConnection,
    profile: music_user::Model,
    favorites: &[FavoriteSong],
) -> Result<()> {
    let mut active: music_user::ActiveModel = profile.into();
    active.favorite_songs = Set(serde_json::to_string(favorites)?);
    active.update(db).await?;
    Ok(())
}

/// Favorites of a user in the order they were added.
pub async fn list_favorites(db: &DatabaseConnection, user_id: u64) -> Result<Vec<FavoriteSong>> {
    match find_music_user(db, user_id).await? {
        Some(profile) => decode_favorites(&profile.favorite_songs),
        None => Ok(Vec::new()),
    }
}

/// Appends a song. Fails on an exact (title, url) duplicate or a full list.
pub async fn add_favorite(
    db: &DatabaseConnection,
    user_id: u64,
    song: FavoriteSong,
) -> Result<Vec<FavoriteSong>> {
    let profile = get_music_user(db, user_id).await?;
    let mut favorites = decode_favorites(&profile.favorite_songs)?;

    if favorites
        .iter()
        .any(|f| f.title == song.title && f.url == song.url)
    {
        return Err(Error::FavoriteExists { title: song.title });
    }
    if favorites.len() >= MAX_FAVORITES {
        return Err(Error::LimitReached {
            kind: "favorite songs",
            cap: MAX_FAVORITES,
        });
    }

    favorites.push(song);
    save_favorites(db, profile, &favorites).await?;
    Ok(favorites)
}

/// Removes the first favorite whose title matches.
pub async fn remove_favorite(
    db: &DatabaseConnection,
    user_id: u64,
    title: &str,
) -> Result<FavoriteSong> {
    let not_found = || Error::FavoriteNotFound {
        title: title.to_string(),
    };
    let profile = find_music_user(db, user_id).await?.ok_or_else(not_found)?;
    let mut favorites = decode_favorites(&profile.favorite_songs)?;

    let index = favorites
        .iter()
        .position(|f| f.title == title)
        .ok_or_else(not_found)?;
    let removed = favorites.remove(index);

    save_favorites(db, profile, &favorites).await?;
    Ok(removed)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;

    const USER: u64 = 20;

    fn song(n: usize) -> FavoriteSong {
        FavoriteSong {
            title: format!("Song {n}"),
            url: format!("https://example.com/{n}"),
            author: "Artist".to_string(),
            artwork_url: None,
            length: 180_000,
        }
    }

    #[tokio::test]
    async fn test_add_and_list_preserve_order() -> Result<()> {
        let db = setup_test_db().await?;
        assert!(list_favorites(&db, USER).await?.is_empty());

        add_favorite(&db, USER, song(2)).await?;
        add_favorite(&db, USER, song(1)).await?;

        let titles: Vec<String> = list_favorites(&db, USER)
            .await?
            .into_iter()
            .map(|f| f.title)
            .collect();
        assert_eq!(titles, vec!["Song 2", "Song 1"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicates_rejected() -> Result<()> {
        let db = setup_test_db().await?;
        add_favorite(&db, USER, song(1)).await?;

        let result = add_favorite(&db, USER, song(1)).await;
        assert!(matches!(result, Err(Error::FavoriteExists { .. })));

        // Same title from another source is a different song
        let mut other = song(1);
        other.url = "https://example.org/other".to_string();
        add_favorite(&db, USER, other).await?;
        assert_eq!(list_favorites(&db, USER).await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_cap_of_twenty_five() -> Result<()> {
        let db = setup_test_db().await?;
        for n in 0..MAX_FAVORITES {
            add_favorite(&db, USER, song(n)).await?;
        }
        let result = add_favorite(&db, USER, song(99)).await;
        assert!(matches!(result, Err(Error::LimitReached { cap: 25, .. })));
        assert_eq!(list_favorites(&db, USER).await?.len(), 25);
        Ok(())
    }

    #[tokio::test]
    async fn test_remove_by_title() -> Result<()> {
        let db = setup_test_db().await?;
        add_favorite(&db, USER, song(1)).await?;
        add_favorite(&db, USER, song(2)).await?;

        let removed = remove_favorite(&db, USER, "Song 1").await?;
        assert_eq!(removed, song(1));
        assert_eq!(list_favorites(&db, USER).await?, vec![song(2)]);

        let result = remove_favorite(&db, USER, "Song 1").await;
        assert!(matches!(result, Err(Error::FavoriteNotFound { .. })));
        Ok(())
    }
}
