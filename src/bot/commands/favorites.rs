//! Favorite song commands - save, list, remove and play favorites.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{Context, commands::enqueue_reply, handlers::autocomplete, invoker},
        core::favorites::{self, MAX_FAVORITES},
        errors::Result,
        music::track::format_length,
    };
    use std::fmt::Write as _;

    /// Your favorite songs.
    #[poise::command(
        slash_command,
        guild_only,
        subcommands(
            "favorites_add",
            "favorites_remove",
            "favorites_list",
            "favorites_play"
        )
    )]
    pub async fn favorites(ctx: Context<'_>) -> Result<()> {
        ctx.say(
            "Favorite songs. Available subcommands:\n\
            `/favorites add` - Save the song that is playing\n\
            `/favorites remove` - Forget a song\n\
            `/favorites list` - Show your songs\n\
            `/favorites play` - Queue all of your songs",
        )
        .await?;
        Ok(())
    }

    /// Saves the song that is playing right now.
    #[poise::command(slash_command, guild_only, rename = "add")]
    pub async fn favorites_add(ctx: Context<'_>) -> Result<()> {
        let invoker = invoker(ctx)?;
        let now = ctx.data().registry.now_playing(invoker).await?;

        let saved =
            favorites::add_favorite(&ctx.data().database, invoker.user_id, now.track.to_favorite())
                .await?;
        ctx.say(format!(
            "⭐ Saved **{}** ({}/{MAX_FAVORITES})",
            now.track.title(),
            saved.len()
        ))
        .await?;
        Ok(())
    }

    #[poise::command(slash_command, rename = "remove")]
    pub async fn favorites_remove(
        ctx: Context<'_>,
        #[description = "Title of the song"]
        #[autocomplete = "autocomplete::autocomplete_favorite"]
        title: String,
    ) -> Result<()> {
        let removed =
            favorites::remove_favorite(&ctx.data().database, ctx.author().id.get(), &title)
                .await?;
        ctx.say(format!("🗑️ Removed **{}** from your favorites", removed.title))
            .await?;
        Ok(())
    }

    #[poise::command(slash_command, rename = "list")]
    pub async fn favorites_list(ctx: Context<'_>) -> Result<()> {
        let saved = favorites::list_favorites(&ctx.data().database, ctx.author().id.get()).await?;
        if saved.is_empty() {
            ctx.say("You have no favorite songs yet. Use `/favorites add` while a song plays.")
                .await?;
            return Ok(());
        }

        let mut text = format!("**Your favorites** ({}/{MAX_FAVORITES})\n", saved.len());
        for (i, song) in saved.iter().enumerate() {
            writeln!(
                text,
                "`{}.` [{}]({}) by {} `[{}]`",
                i + 1,
                song.title,
                song.url,
                song.author,
                format_length(song.length)
            )?;
        }
        ctx.say(text).await?;
        Ok(())
    }

    /// Queues every favorite song in order.
    #[poise::command(slash_command, guild_only, rename = "play")]
    pub async fn favorites_play(ctx: Context<'_>) -> Result<()> {
        let invoker = invoker(ctx)?;
        ctx.defer().await?;
        let outcome = ctx.data().registry.play_favorites(invoker).await?;
        ctx.say(enqueue_reply(&outcome)).await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
