//! Music Discord commands - playback, queue and player controls.
//!
//! Commands reply with the acknowledgement returned by the session registry.
//! Lifecycle messages (now playing, idle disconnect) are posted separately by
//! the notification publisher.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{Context, commands::enqueue_reply, handlers::autocomplete, invoker},
        errors::Result,
        music::track::{SearchHint, format_length},
    };

    #[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
    pub enum SearchSource {
        #[name = "YouTube"]
        Youtube,
        #[name = "Spotify"]
        Spotify,
        #[name = "Direct link"]
        Link,
    }

    impl From<SearchSource> for SearchHint {
        fn from(source: SearchSource) -> Self {
            match source {
                SearchSource::Youtube => Self::Youtube,
                SearchSource::Spotify => Self::SpotifySearch,
                SearchSource::Link => Self::UrlPassthrough,
            }
        }
    }

    /// Plays a song or playlist, joining your voice channel if needed.
    #[poise::command(slash_command, guild_only)]
    pub async fn play(
        ctx: Context<'_>,
        #[description = "Search terms or a link"] query: String,
        #[description = "Where to search (defaults to YouTube)"] source: Option<SearchSource>,
    ) -> Result<()> {
        let invoker = invoker(ctx)?;
        ctx.defer().await?;

        let hint = if query.starts_with("http://") || query.starts_with("https://") {
            SearchHint::UrlPassthrough
        } else {
            source.map_or(SearchHint::Youtube, SearchHint::from)
        };
        let outcome = ctx
            .data()
            .registry
            .play(invoker, query.trim(), hint)
            .await?;
        ctx.say(enqueue_reply(&outcome)).await?;
        Ok(())
    }

    /// Joins your voice channel without playing anything.
    #[poise::command(slash_command, guild_only)]
    pub async fn join(ctx: Context<'_>) -> Result<()> {
        let channel_id = ctx.data().registry.join(invoker(ctx)?).await?;
        ctx.say(format!("🔈 Joined <#{channel_id}>")).await?;
        Ok(())
    }

    #[poise::command(slash_command, guild_only)]
    pub async fn pause(ctx: Context<'_>) -> Result<()> {
        let ack = ctx.data().registry.pause(invoker(ctx)?).await?;
        ctx.say(ack.render()).await?;
        Ok(())
    }

    #[poise::command(slash_command, guild_only)]
    pub async fn resume(ctx: Context<'_>) -> Result<()> {
        let ack = ctx.data().registry.resume(invoker(ctx)?).await?;
        ctx.say(ack.render()).await?;
        Ok(())
    }

    /// Skips the current track.
    #[poise::command(slash_command, guild_only)]
    pub async fn skip(ctx: Context<'_>) -> Result<()> {
        let invoker = invoker(ctx)?;
        ctx.defer().await?;
        let ack = ctx.data().registry.skip(invoker).await?;
        ctx.say(ack.render()).await?;
        Ok(())
    }

    /// Stops playback and clears the queue.
    #[poise::command(slash_command, guild_only)]
    pub async fn stop(ctx: Context<'_>) -> Result<()> {
        let ack = ctx.data().registry.stop_all(invoker(ctx)?).await?;
        ctx.say(ack.render()).await?;
        Ok(())
    }

    /// Repeats the current track until disabled.
    #[poise::command(slash_command, guild_only, rename = "loop")]
    pub async fn loop_track(
        ctx: Context<'_>,
        #[description = "Loop the current track"] enabled: bool,
    ) -> Result<()> {
        let ack = ctx.data().registry.set_loop(invoker(ctx)?, enabled).await?;
        ctx.say(ack.render()).await?;
        Ok(())
    }

    #[poise::command(slash_command, guild_only)]
    pub async fn volume(
        ctx: Context<'_>,
        #[description = "Volume in percent"]
        #[min = 1]
        #[max = 500]
        percent: u16,
    ) -> Result<()> {
        let ack = ctx
            .data()
            .registry
            .set_volume(invoker(ctx)?, percent)
            .await?;
        ctx.say(ack.render()).await?;
        Ok(())
    }

    /// Audio filters.
    #[poise::command(
        slash_command,
        guild_only,
        subcommands("filter_add", "filter_remove")
    )]
    pub async fn filter(ctx: Context<'_>) -> Result<()> {
        ctx.say("Use `/filter add` or `/filter remove`.").await?;
        Ok(())
    }

    #[poise::command(slash_command, guild_only, rename = "add")]
    pub async fn filter_add(
        ctx: Context<'_>,
        #[description = "Filter to enable"]
        #[autocomplete = "autocomplete::autocomplete_filter"]
        name: String,
    ) -> Result<()> {
        let ack = ctx
            .data()
            .registry
            .add_filter(invoker(ctx)?, &name)
            .await?;
        ctx.say(ack.render()).await?;
        Ok(())
    }

    #[poise::command(slash_command, guild_only, rename = "remove")]
    pub async fn filter_remove(
        ctx: Context<'_>,
        #[description = "Filter to disable"]
        #[autocomplete = "autocomplete::autocomplete_filter"]
        name: String,
    ) -> Result<()> {
        let ack = ctx
            .data()
            .registry
            .remove_filter(invoker(ctx)?, &name)
            .await?;
        ctx.say(ack.render()).await?;
        Ok(())
    }

    /// Shows the next tracks in the queue.
    #[poise::command(slash_command, guild_only)]
    pub async fn queue(ctx: Context<'_>) -> Result<()> {
        let view = ctx.data().registry.queue_view(invoker(ctx)?).await?;
        ctx.say(view.render()).await?;
        Ok(())
    }

    #[poise::command(slash_command, guild_only)]
    pub async fn nowplaying(ctx: Context<'_>) -> Result<()> {
        let now = ctx.data().registry.now_playing(invoker(ctx)?).await?;

        let mut text = format!(
            "🎶 **{}** by {} `[{}]`\n🔊 {}%",
            now.track.display(),
            now.track.info.author,
            format_length(now.track.info.length),
            now.volume
        );
        if now.paused {
            text.push_str(" · ⏸️ paused");
        }
        if now.looping {
            text.push_str(" · 🔂 looping");
        }
        if !now.filters.is_empty() {
            let labels: Vec<&str> = now.filters.iter().map(|label| label.as_str()).collect();
            text.push_str(&format!(" · 🎛️ {}", labels.join(", ")));
        }
        ctx.say(text).await?;
        Ok(())
    }

    /// Disconnects the bot and clears the session.
    #[poise::command(slash_command, guild_only)]
    pub async fn leave(ctx: Context<'_>) -> Result<()> {
        let ack = ctx.data().registry.leave(invoker(ctx)?).await?;
        ctx.say(ack.render()).await?;
        Ok(())
    }

    /// Turns automatic now-playing and disconnect messages on or off.
    #[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
    pub async fn alerts(
        ctx: Context<'_>,
        #[description = "Post automatic music messages"] enabled: bool,
    ) -> Result<()> {
        let guild_id = crate::bot::guild_id(ctx)?;
        ctx.data().registry.set_alerts(guild_id, enabled).await?;
        let state = if enabled { "enabled" } else { "disabled" };
        ctx.say(format!("🔔 Music alerts {state}")).await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
