//! Economy Discord commands - balances, transfers, gambling and server setup.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{Context, guild_id},
        core::{
            economy::{self, SettingsPatch},
            gambling::{self, CoinSide, Invocation, WorkOutcome},
        },
        entities::{economy_settings, economy_user},
        errors::Result,
    };
    use chrono::Utc;
    use poise::serenity_prelude as serenity;
    use rand::{SeedableRng, rngs::StdRng};
    use std::fmt::Write as _;

    const LEADERBOARD_SIZE: usize = 10;

    fn format_account(account: &economy_user::Model) -> String {
        format!(
            "👛 Wallet: **{}** · 🏦 Bank: **{}** · Total: **{}**",
            account.wallet,
            account.bank,
            account.wallet.saturating_add(account.bank)
        )
    }

    fn format_settings(settings: &economy_settings::Model) -> String {
        format!(
            "**Economy settings**\n\
            Start balance: {}\n\
            Max balance: {}\n\
            Work: {}% chance to earn {}-{}, every {}s\n\
            Coinflip cooldown: {}s",
            settings.start_balance,
            settings.max_balance,
            settings.win_rate,
            settings.work_min,
            settings.work_max,
            settings.work_cooldown,
            settings.coinflip_cooldown
        )
    }

    fn invocation(ctx: Context<'_>) -> Result<Invocation> {
        Ok(Invocation {
            guild_id: guild_id(ctx)?,
            user_id: ctx.author().id.get(),
            at: Utc::now(),
        })
    }

    /// Server economy administration.
    #[poise::command(
        slash_command,
        guild_only,
        required_permissions = "MANAGE_GUILD",
        subcommands(
            "economy_enable",
            "economy_disable",
            "economy_settings",
            "economy_setbalance"
        )
    )]
    pub async fn economy(ctx: Context<'_>) -> Result<()> {
        ctx.say(
            "Economy administration. Available subcommands:\n\
            `/economy enable` - Turn the economy on\n\
            `/economy disable` - Turn the economy off, keeping balances\n\
            `/economy settings` - Show or change settings\n\
            `/economy setbalance` - Overwrite a member's balance",
        )
        .await?;
        Ok(())
    }

    #[poise::command(slash_command, guild_only, rename = "enable")]
    pub async fn economy_enable(ctx: Context<'_>) -> Result<()> {
        let guild_id = guild_id(ctx)?;
        let settings = economy::enable_economy(&ctx.data().database, guild_id).await?;
        ctx.data().scheduler.start().await?;
        ctx.say(format!("✅ Economy enabled\n{}", format_settings(&settings)))
            .await?;
        Ok(())
    }

    #[poise::command(slash_command, guild_only, rename = "disable")]
    pub async fn economy_disable(ctx: Context<'_>) -> Result<()> {
        economy::disable_economy(&ctx.data().database, guild_id(ctx)?).await?;
        ctx.say("⛔ Economy disabled. Balances and settings are kept.")
            .await?;
        Ok(())
    }

    /// Shows the settings, changing any value given.
    #[poise::command(slash_command, guild_only, rename = "settings")]
    #[allow(clippy::too_many_arguments)]
    pub async fn economy_settings(
        ctx: Context<'_>,
        #[description = "Balance of new members"] start_balance: Option<i64>,
        #[description = "Highest wallet + bank total"] max_balance: Option<i64>,
        #[description = "Chance of earning with /work, in percent"]
        #[min = 1]
        #[max = 100]
        win_rate: Option<i32>,
        #[description = "Seconds between /work uses"] work_cooldown: Option<i64>,
        #[description = "Lowest /work payout"] work_min: Option<i64>,
        #[description = "Highest /work payout"] work_max: Option<i64>,
        #[description = "Seconds between /coinflip uses"] coinflip_cooldown: Option<i64>,
    ) -> Result<()> {
        let patch = SettingsPatch {
            start_balance,
            max_balance,
            win_rate,
            work_cooldown,
            work_min,
            work_max,
            coinflip_cooldown,
        };
        let db = &ctx.data().database;
        let guild_id = guild_id(ctx)?;

        let settings = if patch == SettingsPatch::default() {
            economy::require_settings(db, guild_id).await?
        } else {
            economy::update_settings(db, guild_id, patch).await?
        };
        ctx.say(format_settings(&settings)).await?;
        Ok(())
    }

    #[poise::command(slash_command, guild_only, rename = "setbalance")]
    pub async fn economy_setbalance(
        ctx: Context<'_>,
        #[description = "Member to update"] user: serenity::User,
        #[description = "New wallet balance"] wallet: Option<i64>,
        #[description = "New bank balance"] bank: Option<i64>,
    ) -> Result<()> {
        let account =
            economy::set_balance(&ctx.data().database, guild_id(ctx)?, user.id.get(), wallet, bank)
                .await?;
        ctx.say(format!("✏️ Updated <@{}>\n{}", user.id, format_account(&account)))
            .await?;
        Ok(())
    }

    /// Shows your balance or someone else's.
    #[poise::command(slash_command, guild_only)]
    pub async fn balance(
        ctx: Context<'_>,
        #[description = "Member to look up"] user: Option<serenity::User>,
    ) -> Result<()> {
        let user = user.as_ref().unwrap_or_else(|| ctx.author());
        let account = economy::balance(&ctx.data().database, guild_id(ctx)?, user.id.get()).await?;
        ctx.say(format!("**{}**\n{}", user.name, format_account(&account)))
            .await?;
        Ok(())
    }

    /// Moves money from your wallet to the bank.
    #[poise::command(slash_command, guild_only)]
    pub async fn deposit(
        ctx: Context<'_>,
        #[description = "Amount to deposit"] amount: i64,
    ) -> Result<()> {
        let account =
            economy::deposit(&ctx.data().database, guild_id(ctx)?, ctx.author().id.get(), amount)
                .await?;
        ctx.say(format!("🏦 Deposited **{amount}**\n{}", format_account(&account)))
            .await?;
        Ok(())
    }

    /// Moves money from the bank to your wallet.
    #[poise::command(slash_command, guild_only)]
    pub async fn withdraw(
        ctx: Context<'_>,
        #[description = "Amount to withdraw"] amount: i64,
    ) -> Result<()> {
        let account =
            economy::withdraw(&ctx.data().database, guild_id(ctx)?, ctx.author().id.get(), amount)
                .await?;
        ctx.say(format!("👛 Withdrew **{amount}**\n{}", format_account(&account)))
            .await?;
        Ok(())
    }

    /// Sends money from your wallet to another member.
    #[poise::command(slash_command, guild_only)]
    pub async fn pay(
        ctx: Context<'_>,
        #[description = "Who to pay"] user: serenity::User,
        #[description = "Amount to send"] amount: i64,
    ) -> Result<()> {
        let (sender, _) = economy::pay(
            &ctx.data().database,
            guild_id(ctx)?,
            ctx.author().id.get(),
            user.id.get(),
            amount,
        )
        .await?;
        ctx.say(format!(
            "💸 Paid **{amount}** to <@{}>\n{}",
            user.id,
            format_account(&sender)
        ))
        .await?;
        Ok(())
    }

    #[poise::command(slash_command, guild_only)]
    pub async fn work(ctx: Context<'_>) -> Result<()> {
        let mut rng = StdRng::from_entropy();
        let data = ctx.data();
        let outcome =
            gambling::work(&data.database, &data.cooldowns, invocation(ctx)?, &mut rng).await?;

        let text = match outcome {
            WorkOutcome::Paid { amount, account } => {
                format!("💼 You earned **{amount}**\n{}", format_account(&account))
            }
            WorkOutcome::NothingEarned { account } => {
                format!("😓 You worked hard but earned nothing\n{}", format_account(&account))
            }
        };
        ctx.say(text).await?;
        Ok(())
    }

    #[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
    pub enum CoinCall {
        Heads,
        Tails,
    }

    impl From<CoinCall> for CoinSide {
        fn from(call: CoinCall) -> Self {
            match call {
                CoinCall::Heads => Self::Heads,
                CoinCall::Tails => Self::Tails,
            }
        }
    }

    /// Bets on a coin flip. Winning pays 1.5x, losing costs 2x.
    #[poise::command(slash_command, guild_only)]
    pub async fn coinflip(
        ctx: Context<'_>,
        #[description = "Amount to bet"] bet: i64,
        #[description = "Heads or tails"] call: CoinCall,
    ) -> Result<()> {
        let mut rng = StdRng::from_entropy();
        let data = ctx.data();
        let outcome = gambling::coinflip(
            &data.database,
            &data.cooldowns,
            invocation(ctx)?,
            bet,
            call.into(),
            &mut rng,
        )
        .await?;

        let verdict = if outcome.won {
            format!("🎉 You won **{}**", outcome.delta)
        } else {
            format!("💀 You lost **{}**", -outcome.delta)
        };
        ctx.say(format!(
            "🪙 The coin landed on **{}**. {verdict}\n{}",
            outcome.landed,
            format_account(&outcome.account)
        ))
        .await?;
        Ok(())
    }

    /// Richest members of the server.
    #[poise::command(slash_command, guild_only)]
    pub async fn leaderboard(ctx: Context<'_>) -> Result<()> {
        let accounts =
            economy::leaderboard(&ctx.data().database, guild_id(ctx)?, LEADERBOARD_SIZE).await?;
        if accounts.is_empty() {
            ctx.say("Nobody has any money yet").await?;
            return Ok(());
        }

        let mut text = String::from("**Leaderboard**\n");
        for (i, account) in accounts.iter().enumerate() {
            writeln!(
                text,
                "`{}.` <@{}> - {}",
                i + 1,
                account.user_id,
                account.wallet.saturating_add(account.bank)
            )?;
        }
        ctx.say(text).await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
