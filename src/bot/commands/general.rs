//! General Discord commands - ping, help and audio node status.
//! These commands don't touch the database and are safe to use anywhere.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{bot::Context, errors::Result};
    use std::fmt::Write as _;

    /// Responds with "Pong!" to test bot connectivity.
    #[poise::command(slash_command, prefix_command)]
    pub async fn ping(ctx: Context<'_>) -> Result<()> {
        ctx.say("Pong!").await?;
        Ok(())
    }

    /// Displays help information about available commands.
    #[poise::command(slash_command, prefix_command)]
    pub async fn help(ctx: Context<'_>) -> Result<()> {
        let help_text = "**GuildTunes Help**\n\n\
        **Music**\n\
        • `/play <query> [source]` - Plays a song, playlist or link.\n\
        • `/pause`, `/resume`, `/skip`, `/stop` - Playback controls.\n\
        • `/queue`, `/nowplaying` - What's playing and what's next.\n\
        • `/loop`, `/volume`, `/filter add|remove` - Player settings.\n\
        • `/join`, `/leave` - Move the bot in or out of voice.\n\
        • `/favorites <subcommand>` - Save and replay your favorite songs.\n\
        • `/spotify <subcommand>` - Link Spotify and play your playlists.\n\n\
        **Economy**\n\
        • `/balance`, `/deposit`, `/withdraw`, `/pay` - Manage your money.\n\
        • `/work`, `/coinflip` - Earn (or lose) coins.\n\
        • `/leaderboard` - Richest members.\n\
        • `/shop <subcommand>`, `/inventory` - Buy and view items.\n\n\
        **Administration**\n\
        • `/economy <subcommand>` - Enable, configure and adjust balances.\n\
        • `/income <subcommand>` - Periodic payouts per role.\n\
        • `/alerts` - Toggle automatic music messages.\n\n\
        **Utility**\n\
        • `/status` - Audio node status.\n\
        • `/ping` - Checks if the bot is responsive.";

        ctx.say(help_text).await?;
        Ok(())
    }

    /// Shows whether each audio node is connected.
    #[poise::command(slash_command)]
    pub async fn status(ctx: Context<'_>) -> Result<()> {
        let statuses = ctx.data().lavalink.node_statuses().await;

        let mut text = String::from("**Audio nodes**\n");
        for node in &statuses {
            let state = if node.connected { "🟢 connected" } else { "🔴 offline" };
            writeln!(text, "• `{}` {state}", node.label)?;
        }
        ctx.say(text).await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
