//! Serenity and songbird backed implementations of the platform traits.

use crate::{
    errors::{Error, Result},
    music::voice::{VoiceGateway, VoiceServer},
    platform::{ChannelMessenger, MemberDirectory},
};
use async_trait::async_trait;
use poise::serenity_prelude::{Cache, ChannelId, GuildId, Http, RoleId, UserId};
use songbird::{Songbird, error::JoinError};
use std::sync::Arc;
use tracing::debug;

/// Page size of the member listing endpoint.
const MEMBER_PAGE: u64 = 1000;

/// Voice connections through songbird's gateway-only mode. Membership is read
/// from the serenity cache.
pub struct DiscordVoice {
    songbird: Arc<Songbird>,
    cache: Arc<Cache>,
}

impl DiscordVoice {
    #[must_use]
    pub const fn new(songbird: Arc<Songbird>, cache: Arc<Cache>) -> Self {
        Self { songbird, cache }
    }

    fn channel_of(&self, guild_id: u64, user_id: UserId) -> Option<u64> {
        let guild = self.cache.guild(GuildId::new(guild_id))?;
        guild
            .voice_states
            .get(&user_id)
            .and_then(|state| state.channel_id)
            .map(ChannelId::get)
    }
}

#[async_trait]
impl VoiceGateway for DiscordVoice {
    async fn connect(&self, guild_id: u64, channel_id: u64) -> Result<VoiceServer> {
        if self
            .current_channel(guild_id)
            .is_some_and(|current| current != channel_id)
        {
            return Err(Error::AlreadyConnectedElsewhere);
        }

        let (info, _call) = self
            .songbird
            .join_gateway(GuildId::new(guild_id), ChannelId::new(channel_id))
            .await
            .map_err(|e| Error::VoiceConnectFailed {
                message: e.to_string(),
            })?;
        debug!(guild_id, channel_id, endpoint = %info.endpoint, "Joined voice channel");

        Ok(VoiceServer {
            channel_id,
            endpoint: info.endpoint,
            token: info.token,
            session_id: info.session_id,
        })
    }

    async fn disconnect(&self, guild_id: u64) -> Result<()> {
        match self.songbird.remove(GuildId::new(guild_id)).await {
            Ok(()) | Err(JoinError::NoCall) => Ok(()),
            Err(e) => Err(Error::VoiceConnectFailed {
                message: e.to_string(),
            }),
        }
    }

    fn current_channel(&self, guild_id: u64) -> Option<u64> {
        let bot_id = self.cache.current_user().id;
        self.channel_of(guild_id, bot_id)
    }

    fn user_channel(&self, guild_id: u64, user_id: u64) -> Option<u64> {
        self.channel_of(guild_id, UserId::new(user_id))
    }

    fn member_count(&self, guild_id: u64, channel_id: u64) -> usize {
        let Some(guild) = self.cache.guild(GuildId::new(guild_id)) else {
            return 0;
        };
        guild
            .voice_states
            .values()
            .filter(|state| state.channel_id.map(ChannelId::get) == Some(channel_id))
            .count()
    }
}

pub struct DiscordMessenger {
    http: Arc<Http>,
}

impl DiscordMessenger {
    #[must_use]
    pub const fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ChannelMessenger for DiscordMessenger {
    async fn send_message(&self, channel_id: u64, content: &str) -> Result<()> {
        let http: &Http = &self.http;
        ChannelId::new(channel_id).say(http, content).await?;
        Ok(())
    }
}

pub struct DiscordMembers {
    http: Arc<Http>,
}

impl DiscordMembers {
    #[must_use]
    pub const fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl MemberDirectory for DiscordMembers {
    async fn role_members(&self, guild_id: u64, role_id: u64) -> Result<Vec<u64>> {
        let http: &Http = &self.http;
        let (guild, role) = (GuildId::new(guild_id), RoleId::new(role_id));

        let mut holders = Vec::new();
        let mut after: Option<UserId> = None;
        loop {
            let page = guild.members(http, Some(MEMBER_PAGE), after).await?;
            holders.extend(
                page.iter()
                    .filter(|member| member.roles.contains(&role))
                    .map(|member| member.user.id.get()),
            );
            match page.last() {
                Some(last) if page.len() as u64 == MEMBER_PAGE => after = Some(last.user.id),
                _ => break,
            }
        }
        Ok(holders)
    }

    async fn member_roles(&self, guild_id: u64, user_id: u64) -> Result<Vec<u64>> {
        let http: &Http = &self.http;
        let member = GuildId::new(guild_id)
            .member(http, UserId::new(user_id))
            .await?;
        Ok(member.roles.iter().map(|role| role.get()).collect())
    }

    async fn add_role(&self, guild_id: u64, user_id: u64, role_id: u64) -> Result<()> {
        self.http
            .add_member_role(
                GuildId::new(guild_id),
                UserId::new(user_id),
                RoleId::new(role_id),
                Some("Shop purchase"),
            )
            .await?;
        Ok(())
    }
}
