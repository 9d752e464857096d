//! Spotify commands - link an account and play its public playlists.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{Context, commands::enqueue_reply, handlers::autocomplete, invoker},
        errors::{Error, Result},
        music::{spotify, track::SearchHint},
    };
    use std::fmt::Write as _;

    #[poise::command(
        slash_command,
        subcommands(
            "spotify_link",
            "spotify_unlink",
            "spotify_playlists",
            "spotify_play"
        )
    )]
    pub async fn spotify(ctx: Context<'_>) -> Result<()> {
        ctx.say(
            "Spotify commands. Available subcommands:\n\
            `/spotify link` - Link your Spotify profile\n\
            `/spotify unlink` - Forget your Spotify profile\n\
            `/spotify playlists` - List your public playlists\n\
            `/spotify play` - Queue one of your playlists",
        )
        .await?;
        Ok(())
    }

    /// Links your Spotify profile by id or profile link.
    #[poise::command(slash_command, rename = "link")]
    pub async fn spotify_link(
        ctx: Context<'_>,
        #[description = "Spotify user id or open.spotify.com/user link"] profile: String,
    ) -> Result<()> {
        let data = ctx.data();
        let linked =
            spotify::link_account(&data.database, &data.spotify, ctx.author().id.get(), &profile)
                .await?;
        let name = linked.display_name.as_deref().unwrap_or(&linked.id);
        ctx.say(format!("🔗 Linked Spotify account **{name}**"))
            .await?;
        Ok(())
    }

    #[poise::command(slash_command, rename = "unlink")]
    pub async fn spotify_unlink(ctx: Context<'_>) -> Result<()> {
        if spotify::unlink_account(&ctx.data().database, ctx.author().id.get()).await? {
            ctx.say("🔓 Unlinked your Spotify account").await?;
        } else {
            ctx.say("No Spotify account is linked").await?;
        }
        Ok(())
    }

    #[poise::command(slash_command, rename = "playlists")]
    pub async fn spotify_playlists(ctx: Context<'_>) -> Result<()> {
        let data = ctx.data();
        let playlists =
            spotify::linked_playlists(&data.database, &data.spotify, ctx.author().id.get())
                .await?;
        if playlists.is_empty() {
            ctx.say("Your Spotify account has no public playlists").await?;
            return Ok(());
        }

        let mut text = String::from("**Your playlists**\n");
        for playlist in &playlists {
            writeln!(
                text,
                "• [{}]({}) - {} tracks",
                playlist.name,
                playlist.url(),
                playlist.track_count()
            )?;
        }
        ctx.say(text).await?;
        Ok(())
    }

    /// Queues one of your linked playlists.
    #[poise::command(slash_command, guild_only, rename = "play")]
    pub async fn spotify_play(
        ctx: Context<'_>,
        #[description = "Playlist name"]
        #[autocomplete = "autocomplete::autocomplete_playlist"]
        playlist: String,
    ) -> Result<()> {
        let invoker = invoker(ctx)?;
        ctx.defer().await?;

        let data = ctx.data();
        let playlists =
            spotify::linked_playlists(&data.database, &data.spotify, invoker.user_id).await?;
        let chosen = playlists
            .iter()
            .find(|p| p.name == playlist)
            .ok_or_else(|| Error::NoResults {
                query: playlist.clone(),
            })?;

        let outcome = data
            .registry
            .play(invoker, &chosen.url(), SearchHint::UrlPassthrough)
            .await?;
        ctx.say(enqueue_reply(&outcome)).await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
