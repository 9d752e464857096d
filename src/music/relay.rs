//! The audio relay consumed by music sessions.
//!
//! A relay resolves queries into tracks and drives one remote player per guild.
//! Track ends come back asynchronously as [`MusicEvent::TrackEnd`](super::events::MusicEvent).

use super::{
    filters::{FilterLabel, FilterSpec},
    track::{LoadResult, SearchHint, Track},
    voice::VoiceServer,
};
use crate::errors::Result;
use async_trait::async_trait;

#[async_trait]
pub trait RelayClient: Send + Sync {
    /// Resolves a free-form query or link.
    async fn resolve(&self, query: &str, hint: SearchHint) -> Result<LoadResult>;

    /// Hands the Discord voice credentials of a guild to the remote player.
    async fn bind_voice(&self, guild_id: u64, server: &VoiceServer) -> Result<()>;

    /// Starts `track`, replacing whatever was playing.
    async fn play(&self, guild_id: u64, track: &Track) -> Result<()>;

    async fn pause(&self, guild_id: u64) -> Result<()>;

    async fn resume(&self, guild_id: u64) -> Result<()>;

    /// Stops the current track. The relay answers with a `stopped` track end.
    async fn stop(&self, guild_id: u64) -> Result<()>;

    /// Volume in percent, already validated to `1..=500`.
    async fn set_volume(&self, guild_id: u64, volume: u16) -> Result<()>;

    async fn add_filter(&self, guild_id: u64, label: FilterLabel, spec: &FilterSpec) -> Result<()>;

    async fn remove_filter(&self, guild_id: u64, label: FilterLabel) -> Result<()>;

    /// Drops the remote player of a guild.
    async fn destroy(&self, guild_id: u64) -> Result<()>;
}
