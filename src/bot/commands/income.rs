//! Role income commands - manage periodic payouts per role.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{Context, guild_id},
        core::income::{self, IncomeRule, MAX_INCOME_RULES},
        errors::Result,
    };
    use poise::serenity_prelude as serenity;
    use std::fmt::Write as _;

    /// Periodic payouts to role members.
    #[poise::command(
        slash_command,
        guild_only,
        required_permissions = "MANAGE_GUILD",
        subcommands("income_add", "income_remove", "income_list")
    )]
    pub async fn income(ctx: Context<'_>) -> Result<()> {
        ctx.say(
            "Role income. Available subcommands:\n\
            `/income add` - Pay a role periodically\n\
            `/income remove` - Stop paying a role\n\
            `/income list` - Show configured payouts",
        )
        .await?;
        Ok(())
    }

    /// Adds or replaces the payout of a role.
    #[poise::command(slash_command, guild_only, rename = "add")]
    pub async fn income_add(
        ctx: Context<'_>,
        #[description = "Role to pay"] role: serenity::Role,
        #[description = "Seconds between payouts"]
        #[min = 60]
        interval: u64,
        #[description = "Coins paid to each member"] amount: i64,
        #[description = "Channel to announce payouts in"] channel: Option<serenity::GuildChannel>,
        #[description = "Announcement text"] message: Option<String>,
    ) -> Result<()> {
        let guild_id = guild_id(ctx)?;
        let data = ctx.data();

        let rule = income::add_income_rule(
            &data.database,
            guild_id,
            role.id.get(),
            IncomeRule {
                interval_seconds: interval,
                amount,
                notify_channel_id: channel.map(|c| c.id.get()),
                notify_message: message,
            },
        )
        .await?;
        data.scheduler.rule_updated(guild_id, role.id.get()).await?;

        ctx.say(format!(
            "💰 <@&{}> now earns **{}** every {}s",
            role.id, rule.amount, rule.interval_seconds
        ))
        .await?;
        Ok(())
    }

    #[poise::command(slash_command, guild_only, rename = "remove")]
    pub async fn income_remove(
        ctx: Context<'_>,
        #[description = "Role to stop paying"] role: serenity::Role,
    ) -> Result<()> {
        income::remove_income_rule(&ctx.data().database, guild_id(ctx)?, role.id.get()).await?;
        ctx.say(format!("🛑 <@&{}> no longer earns income", role.id))
            .await?;
        Ok(())
    }

    #[poise::command(slash_command, guild_only, rename = "list")]
    pub async fn income_list(ctx: Context<'_>) -> Result<()> {
        let rules = income::list_income_rules(&ctx.data().database, guild_id(ctx)?).await?;
        if rules.is_empty() {
            ctx.say("No role income is configured").await?;
            return Ok(());
        }

        let mut text = format!("**Role income** ({}/{MAX_INCOME_RULES})\n", rules.len());
        for (role_id, rule) in &rules {
            write!(
                text,
                "• <@&{role_id}>: **{}** every {}s",
                rule.amount, rule.interval_seconds
            )?;
            if let Some(channel_id) = rule.notify_channel_id {
                write!(text, ", announced in <#{channel_id}>")?;
            }
            text.push('\n');
        }
        ctx.say(text).await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
