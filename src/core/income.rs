//! Role income rules - periodic payouts configured per (guild, role).
//!
//! Rules are stored on the guild's settings row as a JSON object keyed by role id.
//! The [`IncomeScheduler`](crate::scheduler::IncomeScheduler) reads them back
//! before every payout, so edits made here take effect without a restart.

use crate::{
    core::economy::{find_settings, require_settings},
    entities::{EconomySettings, economy_settings},
    errors::{Error, Result},
};
use sea_orm::{Set, prelude::*};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Shortest allowed payout interval.
pub const MIN_INTERVAL_SECS: u64 = 60;
/// Most rules a guild can configure.
pub const MAX_INCOME_RULES: usize = 25;

/// A periodic payout to every member of a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomeRule {
    pub interval_seconds: u64,
    pub amount: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify_channel_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify_message: Option<String>,
}

impl IncomeRule {
    pub fn validate(&self) -> Result<()> {
        if self.interval_seconds < MIN_INTERVAL_SECS {
            return Err(Error::InvalidInput {
                message: format!("The interval must be at least {MIN_INTERVAL_SECS} seconds"),
            });
        }
        if self.amount <= 0 {
            return Err(Error::InvalidAmount {
                amount: self.amount,
            });
        }
        Ok(())
    }
}

/// Rules of one guild keyed by role id.
pub type IncomeRules = BTreeMap<u64, IncomeRule>;

pub fn decode_rules(raw: &str) -> Result<IncomeRules> {
    if raw.trim().is_empty() {
        return Ok(IncomeRules::new());
    }
    serde_json::from_str(raw).map_err(Into::into)
}

pub fn encode_rules(rules: &IncomeRules) -> Result<String> {
    serde_json::to_string(rules).map_err(Into::into)
}

async fn save_rules(
    db: &DatabaseConnection,
    settings: economy_settings::Model,
    rules: &IncomeRules,
) -> Result<()> {
    let mut active: economy_settings::ActiveModel = settings.into();
    active.income_roles = Set(encode_rules(rules)?);
    active.update(db).await?;
    Ok(())
}

/// Rules of an enabled guild.
pub async fn list_income_rules(db: &DatabaseConnection, guild_id: u64) -> Result<IncomeRules> {
    let settings = require_settings(db, guild_id).await?;
    decode_rules(&settings.income_roles)
}

/// Adds a rule for `role_id` or replaces the existing one.
pub async fn add_income_rule(
    db: &DatabaseConnection,
    guild_id: u64,
    role_id: u64,
    rule: IncomeRule,
) -> Result<IncomeRule> {
    rule.validate()?;
    let settings = require_settings(db, guild_id).await?;
    let mut rules = decode_rules(&settings.income_roles)?;

    if !rules.contains_key(&role_id) && rules.len() >= MAX_INCOME_RULES {
        return Err(Error::LimitReached {
            kind: "income roles",
            cap: MAX_INCOME_RULES,
        });
    }

    rules.insert(role_id, rule.clone());
    save_rules(db, settings, &rules).await?;
    info!(guild_id, role_id, interval = rule.interval_seconds, amount = rule.amount, "Saved income rule");
    Ok(rule)
}

/// Removes the rule for `role_id`. A scheduled payout for it is dropped at its next firing.
pub async fn remove_income_rule(db: &DatabaseConnection, guild_id: u64, role_id: u64) -> Result<()> {
    let settings = require_settings(db, guild_id).await?;
    let mut rules = decode_rules(&settings.income_roles)?;

    if rules.remove(&role_id).is_none() {
        return Err(Error::IncomeRuleNotFound { role_id });
    }

    save_rules(db, settings, &rules).await?;
    info!(guild_id, role_id, "Removed income rule");
    Ok(())
}

/// Current rule for a role, or `None` if the rule or the economy is gone.
pub async fn find_income_rule(
    db: &DatabaseConnection,
    guild_id: u64,
    role_id: u64,
) -> Result<Option<IncomeRule>> {
    let Some(settings) = find_settings(db, guild_id).await? else {
        return Ok(None);
    };
    if !settings.enabled {
        return Ok(None);
    }
    Ok(decode_rules(&settings.income_roles)?.remove(&role_id))
}

/// Every rule of every enabled guild as `(guild_id, role_id, rule)`.
pub async fn all_income_rules(db: &DatabaseConnection) -> Result<Vec<(u64, u64, IncomeRule)>> {
    let guilds = EconomySettings::find()
        .filter(economy_settings::Column::Enabled.eq(true))
        .all(db)
        .await?;

    let mut all = Vec::new();
    for settings in guilds {
        let Ok(guild_id) = settings.guild_id.parse::<u64>() else {
            continue;
        };
        for (role_id, rule) in decode_rules(&settings.income_roles)? {
            all.push((guild_id, role_id, rule));
        }
    }
    Ok(all)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{core::economy::disable_economy, test_utils::*};

    const GUILD: u64 = 3;

    fn rule(interval_seconds: u64, amount: i64) -> IncomeRule {
        IncomeRule {
            interval_seconds,
            amount,
            notify_channel_id: None,
            notify_message: None,
        }
    }

    #[tokio::test]
    async fn test_add_list_remove_rule() -> Result<()> {
        let db = setup_economy_db(GUILD).await?;
        add_income_rule(&db, GUILD, 11, rule(60, 10)).await?;
        add_income_rule(&db, GUILD, 11, rule(120, 15)).await?;

        let rules = list_income_rules(&db, GUILD).await?;
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[&11], rule(120, 15));

        remove_income_rule(&db, GUILD, 11).await?;
        assert!(find_income_rule(&db, GUILD, 11).await?.is_none());

        let result = remove_income_rule(&db, GUILD, 11).await;
        assert!(matches!(result, Err(Error::IncomeRuleNotFound { role_id: 11 })));
        Ok(())
    }

    #[tokio::test]
    async fn test_rule_validation() -> Result<()> {
        let db = setup_economy_db(GUILD).await?;

        let result = add_income_rule(&db, GUILD, 1, rule(59, 10)).await;
        assert!(matches!(result, Err(Error::InvalidInput { .. })));

        let result = add_income_rule(&db, GUILD, 1, rule(60, 0)).await;
        assert!(matches!(result, Err(Error::InvalidAmount { amount: 0 })));

        for role in 0..25 {
            add_income_rule(&db, GUILD, role, rule(60, 1)).await?;
        }
        let result = add_income_rule(&db, GUILD, 99, rule(60, 1)).await;
        assert!(matches!(result, Err(Error::LimitReached { cap: 25, .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_rules_survive_disable_but_are_hidden() -> Result<()> {
        let db = setup_economy_db(GUILD).await?;
        add_income_rule(&db, GUILD, 8, rule(60, 10)).await?;
        assert_eq!(all_income_rules(&db).await?.len(), 1);

        disable_economy(&db, GUILD).await?;
        assert!(find_income_rule(&db, GUILD, 8).await?.is_none());
        assert!(all_income_rules(&db).await?.is_empty());

        crate::core::economy::enable_economy(&db, GUILD).await?;
        assert_eq!(find_income_rule(&db, GUILD, 8).await?, Some(rule(60, 10)));
        Ok(())
    }

    #[test]
    fn test_rules_are_stored_as_json() -> Result<()> {
        let mut rules = IncomeRules::new();
        rules.insert(
            42,
            IncomeRule {
                notify_channel_id: Some(7),
                notify_message: Some("Payday".to_string()),
                ..rule(3600, 25)
            },
        );
        let raw = encode_rules(&rules)?;
        assert!(raw.starts_with(r#"{"42":{"interval_seconds":3600"#));
        assert_eq!(decode_rules(&raw)?, rules);
        Ok(())
    }
}
