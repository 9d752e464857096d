//! Chat-platform collaborators consumed by the core.
//!
//! The economy, income scheduler and music notifications only need a handful of
//! gateway primitives. Keeping them behind traits lets the core run against
//! in-memory fakes in tests and against serenity in production.

use crate::errors::Result;
use async_trait::async_trait;

/// Sends plain text messages to a channel.
#[async_trait]
pub trait ChannelMessenger: Send + Sync {
    async fn send_message(&self, channel_id: u64, content: &str) -> Result<()>;
}

/// Read and write access to guild role membership.
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    /// User ids of every current member holding `role_id`.
    async fn role_members(&self, guild_id: u64, role_id: u64) -> Result<Vec<u64>>;

    /// Role ids currently held by a member.
    async fn member_roles(&self, guild_id: u64, user_id: u64) -> Result<Vec<u64>>;

    /// Grants a role to a member.
    async fn add_role(&self, guild_id: u64, user_id: u64, role_id: u64) -> Result<()>;
}
