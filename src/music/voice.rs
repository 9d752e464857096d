//! Voice channel membership and connections, as seen by music sessions.

use crate::errors::Result;
use async_trait::async_trait;

/// Credentials of an established voice connection, forwarded to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceServer {
    pub channel_id: u64,
    pub endpoint: String,
    pub token: String,
    pub session_id: String,
}

#[async_trait]
pub trait VoiceGateway: Send + Sync {
    /// Joins `channel_id`.
    ///
    /// Fails with `AlreadyConnectedElsewhere` when the bot sits in another
    /// channel of the guild.
    async fn connect(&self, guild_id: u64, channel_id: u64) -> Result<VoiceServer>;

    /// Leaves voice in a guild. Leaving twice is not an error.
    async fn disconnect(&self, guild_id: u64) -> Result<()>;

    /// Channel the bot is connected to.
    fn current_channel(&self, guild_id: u64) -> Option<u64>;

    /// Channel a user is connected to.
    fn user_channel(&self, guild_id: u64, user_id: u64) -> Option<u64>;

    /// Members in a channel, the bot included.
    fn member_count(&self, guild_id: u64, channel_id: u64) -> usize;
}
