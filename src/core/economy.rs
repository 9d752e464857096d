//! Economy business logic - settings, accounts and the shared write path.
//!
//! Every balance change in the bot goes through [`credit_with`] or [`debit_with`].
//! `credit` keeps `wallet + bank` at or below the guild's maximum by absorbing the
//! overflow into the wallet, so the bank balance is never reduced by a payout.

use crate::{
    entities::{EconomySettings, EconomyUser, economy_settings, economy_user},
    errors::{Error, Result},
};
use sea_orm::{Set, TransactionTrait, prelude::*};
use tracing::debug;

/// Wallet balance of new accounts in a freshly enabled guild.
pub const DEFAULT_START_BALANCE: i64 = 100;
/// Default cap on `wallet + bank`.
pub const DEFAULT_MAX_BALANCE: i64 = 100_000_000;
pub const DEFAULT_WIN_RATE: i32 = 70;
pub const DEFAULT_WORK_COOLDOWN: i64 = 300;
pub const DEFAULT_WORK_MIN: i64 = 50;
pub const DEFAULT_WORK_MAX: i64 = 200;
pub const DEFAULT_COINFLIP_COOLDOWN: i64 = 30;

/// Hard upper bound for the configurable maximum balance.
pub const MAX_BALANCE_LIMIT: i64 = 100_000_000_000;
/// Longest configurable cooldown (12 hours).
pub const MAX_COOLDOWN_SECS: i64 = 43_200;

pub(crate) fn key(id: u64) -> String {
    id.to_string()
}

/// Finds the settings row of a guild regardless of its `enabled` flag.
pub async fn find_settings<C>(db: &C, guild_id: u64) -> Result<Option<economy_settings::Model>>
where
    C: ConnectionTrait,
{
    EconomySettings::find_by_id(key(guild_id))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Returns the settings of a guild whose economy is enabled.
///
/// Fails with [`Error::EconomyDisabled`] when there is no row or the row is
/// switched off.
pub async fn require_settings<C>(db: &C, guild_id: u64) -> Result<economy_settings::Model>
where
    C: ConnectionTrait,
{
    find_settings(db, guild_id)
        .await?
        .filter(|settings| settings.enabled)
        .ok_or(Error::EconomyDisabled)
}

/// Whether economy commands are available in a guild.
pub async fn is_enabled(db: &DatabaseConnection, guild_id: u64) -> Result<bool> {
    Ok(find_settings(db, guild_id)
        .await?
        .is_some_and(|settings| settings.enabled))
}

/// Enables the economy for a guild.
///
/// A guild enabling for the first time gets the default configuration. A guild
/// that was disabled earlier gets its previous configuration and income rules back.
pub async fn enable_economy(
    db: &DatabaseConnection,
    guild_id: u64,
) -> Result<economy_settings::Model> {
    if let Some(existing) = find_settings(db, guild_id).await? {
        if existing.enabled {
            return Ok(existing);
        }
        let mut active: economy_settings::ActiveModel = existing.into();
        active.enabled = Set(true);
        return active.update(db).await.map_err(Into::into);
    }

    let settings = economy_settings::ActiveModel {
        guild_id: Set(key(guild_id)),
        enabled: Set(true),
        start_balance: Set(DEFAULT_START_BALANCE),
        max_balance: Set(DEFAULT_MAX_BALANCE),
        win_rate: Set(DEFAULT_WIN_RATE),
        work_cooldown: Set(DEFAULT_WORK_COOLDOWN),
        work_min: Set(DEFAULT_WORK_MIN),
        work_max: Set(DEFAULT_WORK_MAX),
        coinflip_cooldown: Set(DEFAULT_COINFLIP_COOLDOWN),
        income_roles: Set("{}".to_string()),
    };

    settings.insert(db).await.map_err(Into::into)
}

/// Disables the economy for a guild while keeping its configuration.
pub async fn disable_economy(db: &DatabaseConnection, guild_id: u64) -> Result<()> {
    let settings = require_settings(db, guild_id).await?;
    let mut active: economy_settings::ActiveModel = settings.into();
    active.enabled = Set(false);
    active.update(db).await?;
    Ok(())
}

/// Partial update of a guild's economy settings. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub start_balance: Option<i64>,
    pub max_balance: Option<i64>,
    pub win_rate: Option<i32>,
    pub work_cooldown: Option<i64>,
    pub work_min: Option<i64>,
    pub work_max: Option<i64>,
    pub coinflip_cooldown: Option<i64>,
}

/// Checks the ranges every settings row must satisfy.
pub fn validate_settings(settings: &economy_settings::Model) -> Result<()> {
    let invalid = |message: &str| {
        Err(Error::InvalidInput {
            message: message.to_string(),
        })
    };

    if settings.start_balance < 0 {
        return invalid("The start balance cannot be negative");
    }
    if settings.max_balance <= 0 || settings.max_balance > MAX_BALANCE_LIMIT {
        return invalid("The maximum balance must be between 1 and 100 000 000 000");
    }
    if settings.start_balance > settings.max_balance {
        return invalid("The start balance cannot exceed the maximum balance");
    }
    if !(1..=100).contains(&settings.win_rate) {
        return invalid("The work win rate must be between 1 and 100 percent");
    }
    if !(1..=MAX_COOLDOWN_SECS).contains(&settings.work_cooldown)
        || !(1..=MAX_COOLDOWN_SECS).contains(&settings.coinflip_cooldown)
    {
        return invalid("Cooldowns must be between 1 and 43 200 seconds");
    }
    if settings.work_min < 0 || settings.work_min >= settings.work_max {
        return invalid("The minimum work income must be lower than the maximum");
    }
    Ok(())
}

/// Applies a [`SettingsPatch`] after validating the merged result.
pub async fn update_settings(
    db: &DatabaseConnection,
    guild_id: u64,
    patch: SettingsPatch,
) -> Result<economy_settings::Model> {
    let current = require_settings(db, guild_id).await?;

    let mut merged = current.clone();
    if let Some(v) = patch.start_balance {
        merged.start_balance = v;
    }
    if let Some(v) = patch.max_balance {
        merged.max_balance = v;
    }
    if let Some(v) = patch.win_rate {
        merged.win_rate = v;
    }
    if let Some(v) = patch.work_cooldown {
        merged.work_cooldown = v;
    }
    if let Some(v) = patch.work_min {
        merged.work_min = v;
    }
    if let Some(v) = patch.work_max {
        merged.work_max = v;
    }
    if let Some(v) = patch.coinflip_cooldown {
        merged.coinflip_cooldown = v;
    }
    validate_settings(&merged)?;

    let mut active: economy_settings::ActiveModel = current.into();
    active.start_balance = Set(merged.start_balance);
    active.max_balance = Set(merged.max_balance);
    active.win_rate = Set(merged.win_rate);
    active.work_cooldown = Set(merged.work_cooldown);
    active.work_min = Set(merged.work_min);
    active.work_max = Set(merged.work_max);
    active.coinflip_cooldown = Set(merged.coinflip_cooldown);
    active.update(db).await.map_err(Into::into)
}

/// Loads an account, creating it with the guild's start balance on first reference.
pub async fn get_account<C>(
    db: &C,
    settings: &economy_settings::Model,
    user_id: u64,
) -> Result<economy_user::Model>
where
    C: ConnectionTrait,
{
    let id = (settings.guild_id.clone(), key(user_id));
    if let Some(account) = EconomyUser::find_by_id(id.clone()).one(db).await? {
        return Ok(account);
    }

    let account = economy_user::ActiveModel {
        guild_id: Set(settings.guild_id.clone()),
        user_id: Set(key(user_id)),
        wallet: Set(settings.start_balance),
        bank: Set(0),
        items: Set("[]".to_string()),
    };

    match account.insert(db).await {
        Ok(created) => {
            debug!(guild_id = %settings.guild_id, user_id, "Created economy account");
            Ok(created)
        }
        // Another task created the row between our read and insert
        Err(e) => EconomyUser::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| Error::Database(e)),
    }
}

/// Returns the account of a member in an enabled guild.
pub async fn balance(
    db: &DatabaseConnection,
    guild_id: u64,
    user_id: u64,
) -> Result<economy_user::Model> {
    let settings = require_settings(db, guild_id).await?;
    get_account(db, &settings, user_id).await
}

/// Writes new balances for an account in a single-row update.
pub(crate) async fn save_balances<C>(
    db: &C,
    account: economy_user::Model,
    wallet: i64,
    bank: i64,
) -> Result<economy_user::Model>
where
    C: ConnectionTrait,
{
    if account.wallet == wallet && account.bank == bank {
        return Ok(account);
    }
    let mut active: economy_user::ActiveModel = account.into();
    active.wallet = Set(wallet);
    active.bank = Set(bank);
    active.update(db).await.map_err(Into::into)
}

/// Adds the deltas to an account and clamps `wallet + bank` to the guild maximum.
///
/// Overflow is absorbed by the wallet: the bank keeps its value and the wallet
/// becomes `max_balance - bank`.
pub async fn credit_with<C>(
    db: &C,
    settings: &economy_settings::Model,
    user_id: u64,
    wallet_delta: i64,
    bank_delta: i64,
) -> Result<economy_user::Model>
where
    C: ConnectionTrait,
{
    let account = get_account(db, settings, user_id).await?;
    let (wallet, bank) = clamp_balances(
        account.wallet.saturating_add(wallet_delta),
        account.bank.saturating_add(bank_delta),
        settings.max_balance,
    );
    save_balances(db, account, wallet, bank).await
}

const fn clamp_balances(wallet: i64, bank: i64, max_balance: i64) -> (i64, i64) {
    if wallet.saturating_add(bank) > max_balance {
        (max_balance - bank, bank)
    } else {
        (wallet, bank)
    }
}

/// Credits an account in an enabled guild.
pub async fn credit(
    db: &DatabaseConnection,
    guild_id: u64,
    user_id: u64,
    wallet_delta: i64,
    bank_delta: i64,
) -> Result<economy_user::Model> {
    let settings = require_settings(db, guild_id).await?;
    credit_with(db, &settings, user_id, wallet_delta, bank_delta).await
}

/// Subtracts from the wallet without a balance guard.
///
/// The wallet may go negative; callers check the balance first when that matters.
pub async fn debit_with<C>(
    db: &C,
    settings: &economy_settings::Model,
    user_id: u64,
    wallet_amount: i64,
) -> Result<economy_user::Model>
where
    C: ConnectionTrait,
{
    let account = get_account(db, settings, user_id).await?;
    let wallet = account.wallet.saturating_sub(wallet_amount);
    let bank = account.bank;
    save_balances(db, account, wallet, bank).await
}

/// Debits an account in an enabled guild.
pub async fn debit(
    db: &DatabaseConnection,
    guild_id: u64,
    user_id: u64,
    wallet_amount: i64,
) -> Result<economy_user::Model> {
    let settings = require_settings(db, guild_id).await?;
    debit_with(db, &settings, user_id, wallet_amount).await
}

fn require_positive(amount: i64) -> Result<()> {
    if amount <= 0 {
        return Err(Error::InvalidAmount { amount });
    }
    Ok(())
}

/// Moves `amount` from the wallet to the bank.
pub async fn deposit(
    db: &DatabaseConnection,
    guild_id: u64,
    user_id: u64,
    amount: i64,
) -> Result<economy_user::Model> {
    require_positive(amount)?;
    let settings = require_settings(db, guild_id).await?;
    let account = get_account(db, &settings, user_id).await?;

    if account.wallet < amount {
        return Err(Error::InsufficientFunds {
            current: account.wallet,
            required: amount,
        });
    }

    let wallet = account.wallet - amount;
    let bank = account.bank + amount;
    save_balances(db, account, wallet, bank).await
}

/// Moves `amount` from the bank to the wallet.
pub async fn withdraw(
    db: &DatabaseConnection,
    guild_id: u64,
    user_id: u64,
    amount: i64,
) -> Result<economy_user::Model> {
    require_positive(amount)?;
    let settings = require_settings(db, guild_id).await?;
    let account = get_account(db, &settings, user_id).await?;

    if account.bank < amount {
        return Err(Error::InsufficientFunds {
            current: account.bank,
            required: amount,
        });
    }

    let wallet = account.wallet + amount;
    let bank = account.bank - amount;
    save_balances(db, account, wallet, bank).await
}

/// Transfers wallet currency between two members.
///
/// Returns the sender and receiver accounts after the transfer. The receiver is
/// credited through the clamping path, so currency above their maximum is lost.
pub async fn pay(
    db: &DatabaseConnection,
    guild_id: u64,
    from_user: u64,
    to_user: u64,
    amount: i64,
) -> Result<(economy_user::Model, economy_user::Model)> {
    require_positive(amount)?;
    if from_user == to_user {
        return Err(Error::InvalidInput {
            message: "You cannot pay yourself".to_string(),
        });
    }

    let settings = require_settings(db, guild_id).await?;
    let txn = db.begin().await?;
    let sender = get_account(&txn, &settings, from_user).await?;
    if sender.wallet < amount {
        return Err(Error::InsufficientFunds {
            current: sender.wallet,
            required: amount,
        });
    }

    let sender = debit_with(&txn, &settings, from_user, amount).await?;
    let receiver = credit_with(&txn, &settings, to_user, amount, 0).await?;
    txn.commit().await?;
    Ok((sender, receiver))
}

/// Overwrites balances of a member. Unset values stay unchanged.
pub async fn set_balance(
    db: &DatabaseConnection,
    guild_id: u64,
    user_id: u64,
    wallet: Option<i64>,
    bank: Option<i64>,
) -> Result<economy_user::Model> {
    let settings = require_settings(db, guild_id).await?;
    let account = get_account(db, &settings, user_id).await?;

    let new_wallet = wallet.unwrap_or(account.wallet);
    let new_bank = bank.unwrap_or(account.bank);
    if new_wallet < 0 || new_bank < 0 {
        return Err(Error::InvalidAmount {
            amount: new_wallet.min(new_bank),
        });
    }
    if new_wallet.saturating_add(new_bank) > settings.max_balance {
        return Err(Error::InvalidInput {
            message: format!(
                "Wallet and bank together cannot exceed {}",
                settings.max_balance
            ),
        });
    }

    save_balances(db, account, new_wallet, new_bank).await
}

/// Richest members of a guild by `wallet + bank`, highest first.
pub async fn leaderboard(
    db: &DatabaseConnection,
    guild_id: u64,
    limit: usize,
) -> Result<Vec<economy_user::Model>> {
    let settings = require_settings(db, guild_id).await?;
    let mut accounts = EconomyUser::find()
        .filter(economy_user::Column::GuildId.eq(settings.guild_id))
        .all(db)
        .await?;

    accounts.sort_by_key(|a| std::cmp::Reverse(a.wallet.saturating_add(a.bank)));
    accounts.truncate(limit);
    Ok(accounts)
}
