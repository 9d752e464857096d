//! Autocomplete handlers for Discord slash command parameters.
//!
//! Every handler returns at most 25 suggestions, the Discord limit, and
//! swallows lookup errors by suggesting nothing.

use crate::{
    bot::Context,
    core::{favorites, shop},
    music::{filters::FilterLabel, spotify},
};

const MAX_SUGGESTIONS: usize = 25;

fn matching<I>(candidates: I, partial: &str) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let partial_lower = partial.to_lowercase();
    candidates
        .into_iter()
        .filter(|name| name.to_lowercase().contains(&partial_lower))
        .take(MAX_SUGGESTIONS)
        .collect()
}

/// Provides autocomplete suggestions for shop item names.
///
/// Items are listed cheapest first, the order used by `/shop list`.
pub async fn autocomplete_shop_item(ctx: Context<'_>, partial: &str) -> Vec<String> {
    let Some(guild_id) = ctx.guild_id() else {
        return Vec::new();
    };
    let Ok(items) = shop::list_items(&ctx.data().database, guild_id.get()).await else {
        return Vec::new();
    };
    matching(items.into_iter().map(|item| item.name), partial)
}

/// Titles of the invoking user's favorites.
pub async fn autocomplete_favorite(ctx: Context<'_>, partial: &str) -> Vec<String> {
    let user_id = ctx.author().id.get();
    let Ok(saved) = favorites::list_favorites(&ctx.data().database, user_id).await else {
        return Vec::new();
    };
    matching(saved.into_iter().map(|song| song.title), partial)
}

fn filter_suggestions(partial: &str) -> Vec<String> {
    matching(
        FilterLabel::ALL.iter().map(|label| label.as_str().to_string()),
        partial,
    )
}

/// Labels of the supported audio filters.
pub async fn autocomplete_filter(_ctx: Context<'_>, partial: &str) -> Vec<String> {
    filter_suggestions(partial)
}

/// Playlist names of the invoking user's linked Spotify account.
pub async fn autocomplete_playlist(ctx: Context<'_>, partial: &str) -> Vec<String> {
    let data = ctx.data();
    let Ok(playlists) =
        spotify::linked_playlists(&data.database, &data.spotify, ctx.author().id.get()).await
    else {
        return Vec::new();
    };
    matching(playlists.into_iter().map(|playlist| playlist.name), partial)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_is_case_insensitive_and_capped() {
        let names = (0..40).map(|i| format!("Item {i}"));
        assert_eq!(matching(names, "item").len(), MAX_SUGGESTIONS);

        let names = ["Golden Ticket", "VIP Pass", "golden apple"].map(String::from);
        assert_eq!(
            matching(names, "GOLD"),
            vec!["Golden Ticket".to_string(), "golden apple".to_string()]
        );
    }

    #[test]
    fn test_filter_suggestions() {
        assert_eq!(filter_suggestions("").len(), FilterLabel::ALL.len());
        assert_eq!(filter_suggestions("NIGHT"), vec!["nightcore".to_string()]);
        assert!(filter_suggestions("reverb").is_empty());
    }
}
