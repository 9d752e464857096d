//! Work and coinflip, the two cooldown-gated ways of earning currency.
//!
//! Cooldowns live in memory only. A restart resets them, which is acceptable for
//! commands measured in seconds to hours.

use crate::{
    core::economy::{credit_with, debit_with, get_account, require_settings},
    entities::economy_user,
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::Rng;
use sea_orm::DatabaseConnection;
use tracing::debug;

/// Commands subject to a per-member cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CooldownAction {
    Work,
    Coinflip,
}

/// Last successful invocation per (guild, user, action).
#[derive(Debug, Default)]
pub struct CooldownTracker {
    last_used: DashMap<(u64, u64, CooldownAction), DateTime<Utc>>,
}

impl CooldownTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails with [`Error::CooldownActive`] while fewer than `cooldown_secs`
    /// seconds have passed since the last recorded use.
    pub fn check(
        &self,
        guild_id: u64,
        user_id: u64,
        action: CooldownAction,
        cooldown_secs: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let Some(last) = self.last_used.get(&(guild_id, user_id, action)) else {
            return Ok(());
        };

        let elapsed = (now - *last).num_seconds();
        if elapsed >= cooldown_secs {
            Ok(())
        } else {
            Err(Error::CooldownActive {
                remaining_secs: cooldown_secs - elapsed,
            })
        }
    }

    pub fn record(&self, guild_id: u64, user_id: u64, action: CooldownAction, now: DateTime<Utc>) {
        self.last_used.insert((guild_id, user_id, action), now);
    }
}

/// Who invoked a gambling command and when.
#[derive(Debug, Clone, Copy)]
pub struct Invocation {
    pub guild_id: u64,
    pub user_id: u64,
    pub at: DateTime<Utc>,
}

/// Result of a `/work` invocation.
#[derive(Debug, Clone)]
pub enum WorkOutcome {
    Paid {
        amount: i64,
        account: economy_user::Model,
    },
    NothingEarned {
        account: economy_user::Model,
    },
}

/// Pays a random amount in `[work_min, work_max]` with `win_rate` percent chance.
pub async fn work<R>(
    db: &DatabaseConnection,
    cooldowns: &CooldownTracker,
    invocation: Invocation,
    rng: &mut R,
) -> Result<WorkOutcome>
where
    R: Rng + Send,
{
    let Invocation {
        guild_id,
        user_id,
        at,
    } = invocation;
    let settings = require_settings(db, guild_id).await?;
    cooldowns.check(
        guild_id,
        user_id,
        CooldownAction::Work,
        settings.work_cooldown,
        at,
    )?;

    let won = rng.gen_bool(f64::from(settings.win_rate) / 100.0);
    let outcome = if won {
        let amount = rng.gen_range(settings.work_min..=settings.work_max);
        let account = credit_with(db, &settings, user_id, amount, 0).await?;
        WorkOutcome::Paid { amount, account }
    } else {
        let account = get_account(db, &settings, user_id).await?;
        WorkOutcome::NothingEarned { account }
    };

    cooldowns.record(guild_id, user_id, CooldownAction::Work, at);
    debug!(guild_id, user_id, won, "Work completed");
    Ok(outcome)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoinSide {
    Heads,
    Tails,
}

impl std::fmt::Display for CoinSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Heads => write!(f, "heads"),
            Self::Tails => write!(f, "tails"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoinflipOutcome {
    pub landed: CoinSide,
    pub won: bool,
    /// Signed wallet change applied by the flip
    pub delta: i64,
    pub account: economy_user::Model,
}

/// Flips a coin for `bet`.
///
/// A correct call pays `1.5 * bet`. A wrong call costs `2 * bet`, limited to the
/// wallet balance so a flip can never push the wallet below zero.
pub async fn coinflip<R>(
    db: &DatabaseConnection,
    cooldowns: &CooldownTracker,
    invocation: Invocation,
    bet: i64,
    call: CoinSide,
    rng: &mut R,
) -> Result<CoinflipOutcome>
where
    R: Rng + Send,
{
    let Invocation {
        guild_id,
        user_id,
        at,
    } = invocation;
    if bet <= 0 {
        return Err(Error::InvalidAmount { amount: bet });
    }

    let settings = require_settings(db, guild_id).await?;
    cooldowns.check(
        guild_id,
        user_id,
        CooldownAction::Coinflip,
        settings.coinflip_cooldown,
        at,
    )?;

    let account = get_account(db, &settings, user_id).await?;
    if account.wallet < bet {
        return Err(Error::InsufficientFunds {
            current: account.wallet,
            required: bet,
        });
    }

    let landed = if rng.gen_bool(0.5) {
        CoinSide::Heads
    } else {
        CoinSide::Tails
    };
    let won = landed == call;

    let (delta, account) = if won {
        let payout = bet.saturating_add(bet / 2);
        (payout, credit_with(db, &settings, user_id, payout, 0).await?)
    } else {
        let loss = bet.saturating_mul(2).min(account.wallet);
        (-loss, debit_with(db, &settings, user_id, loss).await?)
    };

    cooldowns.record(guild_id, user_id, CooldownAction::Coinflip, at);
    Ok(CoinflipOutcome {
        landed,
        won,
        delta,
        account,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{
        core::economy::{SettingsPatch, set_balance, update_settings},
        test_utils::*,
    };
    use chrono::{Duration, TimeZone};
    use rand::rngs::mock::StepRng;

    const GUILD: u64 = 7;
    const USER: u64 = 70;

    fn at(secs: i64) -> Invocation {
        Invocation {
            guild_id: GUILD,
            user_id: USER,
            at: Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs),
        }
    }

    fn always_low() -> StepRng {
        StepRng::new(0, 0)
    }

    fn always_high() -> StepRng {
        StepRng::new(u64::MAX, 0)
    }

    #[tokio::test]
    async fn test_work_pays_within_range() -> Result<()> {
        let db = setup_economy_db(GUILD).await?;
        let cooldowns = CooldownTracker::new();

        let outcome = work(&db, &cooldowns, at(0), &mut always_low()).await?;
        match outcome {
            WorkOutcome::Paid { amount, account } => {
                assert_eq!(amount, 50);
                assert_eq!(account.wallet, 150);
            }
            WorkOutcome::NothingEarned { .. } => panic!("expected a payout"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_work_can_earn_nothing() -> Result<()> {
        let db = setup_economy_db(GUILD).await?;
        let cooldowns = CooldownTracker::new();

        let outcome = work(&db, &cooldowns, at(0), &mut always_high()).await?;
        assert!(matches!(
            outcome,
            WorkOutcome::NothingEarned { ref account } if account.wallet == 100
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_work_cooldown_boundary() -> Result<()> {
        let db = setup_economy_db(GUILD).await?;
        let cooldowns = CooldownTracker::new();
        work(&db, &cooldowns, at(0), &mut always_low()).await?;

        let result = work(&db, &cooldowns, at(299), &mut always_low()).await;
        assert!(matches!(
            result,
            Err(Error::CooldownActive { remaining_secs: 1 })
        ));

        // Elapsed time equal to the cooldown is allowed
        work(&db, &cooldowns, at(300), &mut always_low()).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_coinflip_win_pays_one_and_a_half() -> Result<()> {
        let db = setup_economy_db(GUILD).await?;
        let cooldowns = CooldownTracker::new();

        let outcome = coinflip(
            &db,
            &cooldowns,
            at(0),
            40,
            CoinSide::Heads,
            &mut always_low(),
        )
        .await?;
        assert_eq!(outcome.landed, CoinSide::Heads);
        assert!(outcome.won);
        assert_eq!(outcome.delta, 60);
        assert_eq!(outcome.account.wallet, 160);
        Ok(())
    }

    #[tokio::test]
    async fn test_coinflip_loss_is_clamped_to_wallet() -> Result<()> {
        let db = setup_economy_db(GUILD).await?;
        let cooldowns = CooldownTracker::new();

        let outcome = coinflip(
            &db,
            &cooldowns,
            at(0),
            80,
            CoinSide::Tails,
            &mut always_low(),
        )
        .await?;
        assert!(!outcome.won);
        assert_eq!(outcome.delta, -100);
        assert_eq!(outcome.account.wallet, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_coinflip_requires_covered_bet() -> Result<()> {
        let db = setup_economy_db(GUILD).await?;
        let cooldowns = CooldownTracker::new();
        set_balance(&db, GUILD, USER, Some(10), None).await?;

        let result = coinflip(
            &db,
            &cooldowns,
            at(0),
            11,
            CoinSide::Heads,
            &mut always_low(),
        )
        .await;
        assert!(matches!(
            result,
            Err(Error::InsufficientFunds {
                current: 10,
                required: 11
            })
        ));

        let result = coinflip(&db, &cooldowns, at(0), 0, CoinSide::Heads, &mut always_low()).await;
        assert!(matches!(result, Err(Error::InvalidAmount { amount: 0 })));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_flip_does_not_start_cooldown() -> Result<()> {
        let db = setup_economy_db(GUILD).await?;
        update_settings(
            &db,
            GUILD,
            SettingsPatch {
                coinflip_cooldown: Some(60),
                ..Default::default()
            },
        )
        .await?;
        let cooldowns = CooldownTracker::new();

        let result = coinflip(
            &db,
            &cooldowns,
            at(0),
            1_000,
            CoinSide::Heads,
            &mut always_low(),
        )
        .await;
        assert!(result.is_err());

        coinflip(&db, &cooldowns, at(1), 10, CoinSide::Heads, &mut always_low()).await?;
        let result = coinflip(&db, &cooldowns, at(2), 10, CoinSide::Heads, &mut always_low()).await;
        assert!(matches!(
            result,
            Err(Error::CooldownActive { remaining_secs: 59 })
        ));
        Ok(())
    }
}
