//! Periodic role income payouts.
//!
//! One task runs per (guild, role) rule. Each firing re-reads the rule from the
//! database, so edits apply at the next payout and a deleted rule stops its task
//! without any explicit cancel.

use crate::{
    core::{
        economy::{credit_with, require_settings},
        income::{IncomeRule, all_income_rules, find_income_rule},
    },
    errors::Result,
    platform::{ChannelMessenger, MemberDirectory},
};
use futures_util::FutureExt;
use sea_orm::DatabaseConnection;
use std::{
    collections::HashMap,
    panic::AssertUnwindSafe,
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, error, info, warn};

type RuleKey = (u64, u64);

pub struct IncomeScheduler {
    db: DatabaseConnection,
    members: Arc<dyn MemberDirectory>,
    messenger: Arc<dyn ChannelMessenger>,
    /// Wall-clock length of one rule second
    second: Duration,
    tasks: Mutex<HashMap<RuleKey, JoinHandle<()>>>,
    this: Weak<Self>,
}

impl IncomeScheduler {
    #[must_use]
    pub fn new(
        db: DatabaseConnection,
        members: Arc<dyn MemberDirectory>,
        messenger: Arc<dyn ChannelMessenger>,
    ) -> Arc<Self> {
        Self::with_time_unit(db, members, messenger, Duration::from_secs(1))
    }

    /// Scheduler whose intervals are measured in units of `second`.
    #[must_use]
    pub fn with_time_unit(
        db: DatabaseConnection,
        members: Arc<dyn MemberDirectory>,
        messenger: Arc<dyn ChannelMessenger>,
        second: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            db,
            members,
            messenger,
            second,
            tasks: Mutex::new(HashMap::new()),
            this: this.clone(),
        })
    }

    /// Arms a task for every stored rule. Returns how many were armed.
    pub async fn start(&self) -> Result<usize> {
        let rules = all_income_rules(&self.db).await?;
        let mut armed = 0;
        for (guild_id, role_id, rule) in rules {
            if self.arm(guild_id, role_id, rule).await {
                armed += 1;
            }
        }
        info!(armed, "Income scheduler started");
        Ok(armed)
    }

    /// Picks up a rule that was just added or changed.
    ///
    /// A running task already reads the new values at its next firing, so
    /// only rules without one get a new task.
    pub async fn rule_updated(&self, guild_id: u64, role_id: u64) -> Result<()> {
        if let Some(rule) = find_income_rule(&self.db, guild_id, role_id).await? {
            self.arm(guild_id, role_id, rule).await;
        }
        Ok(())
    }

    /// Number of live payout tasks.
    pub async fn active_tasks(&self) -> usize {
        self.tasks
            .lock()
            .await
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    pub async fn shutdown(&self) {
        let mut tasks = self.tasks.lock().await;
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
        info!("Income scheduler stopped");
    }

    async fn arm(&self, guild_id: u64, role_id: u64, rule: IncomeRule) -> bool {
        let Some(this) = self.this.upgrade() else {
            return false;
        };
        let mut tasks = self.tasks.lock().await;
        if tasks
            .get(&(guild_id, role_id))
            .is_some_and(|handle| !handle.is_finished())
        {
            return false;
        }

        debug!(guild_id, role_id, interval = rule.interval_seconds, "Arming income task");
        let handle = tokio::spawn(this.run_rule(guild_id, role_id, rule));
        tasks.insert((guild_id, role_id), handle);
        true
    }

    async fn run_rule(self: Arc<Self>, guild_id: u64, role_id: u64, mut rule: IncomeRule) {
        loop {
            let units = u32::try_from(rule.interval_seconds).unwrap_or(u32::MAX);
            tokio::time::sleep(self.second.saturating_mul(units)).await;

            // Checked under the task lock so a concurrent `rule_updated` either
            // sees this task alive or finds it already gone.
            {
                let mut tasks = self.tasks.lock().await;
                match find_income_rule(&self.db, guild_id, role_id).await {
                    Ok(Some(latest)) => rule = latest,
                    Ok(None) => {
                        tasks.remove(&(guild_id, role_id));
                        info!(guild_id, role_id, "Income rule removed, stopping its task");
                        return;
                    }
                    Err(e) => {
                        warn!(guild_id, role_id, "Could not read income rule, skipping payout: {e}");
                        continue;
                    }
                }
            }

            match AssertUnwindSafe(self.pay_out(guild_id, role_id, &rule))
                .catch_unwind()
                .await
            {
                Ok(Ok(paid)) => debug!(guild_id, role_id, paid, "Paid role income"),
                Ok(Err(e)) => warn!(guild_id, role_id, "Income payout failed: {e}"),
                Err(_) => error!(guild_id, role_id, "Income payout panicked"),
            }
        }
    }

    /// Credits every member of the role. Returns how many were paid.
    async fn pay_out(&self, guild_id: u64, role_id: u64, rule: &IncomeRule) -> Result<usize> {
        let settings = require_settings(&self.db, guild_id).await?;
        let members = self.members.role_members(guild_id, role_id).await?;

        let mut paid = 0;
        for user_id in members {
            match credit_with(&self.db, &settings, user_id, rule.amount, 0).await {
                Ok(_) => paid += 1,
                Err(e) => warn!(guild_id, role_id, user_id, "Failed to credit income: {e}"),
            }
        }

        if let (Some(channel_id), Some(message)) = (rule.notify_channel_id, &rule.notify_message) {
            if let Err(e) = self.messenger.send_message(channel_id, message).await {
                warn!(guild_id, role_id, channel_id, "Failed to post income message: {e}");
            }
        }
        Ok(paid)
    }
}
