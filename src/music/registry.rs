//! Guild to session mapping and the command-level music operations.
//!
//! Each guild has a slot guarded by an async mutex. Every operation, relay
//! event and idle check for a guild takes that lock, so work on one guild is
//! serialized in arrival order while different guilds proceed independently.

use super::{
    events::MusicEventHandler,
    filters::FilterLabel,
    notify::{DisconnectReason, Notification},
    session::{EnqueueOutcome, MusicContext, MusicSession, TrackEndOutcome},
    track::{LoadResult, SearchHint, Track, TrackEndReason},
};
use crate::{
    core::{favorites, music_settings},
    errors::{Error, Result},
};
use async_trait::async_trait;
use dashmap::DashMap;
use sea_orm::DatabaseConnection;
use std::{
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, info, instrument, warn};

pub const IDLE_TIMEOUT: Duration = Duration::from_secs(150);
pub const IDLE_TICK: Duration = Duration::from_secs(5);
pub const MIN_VOLUME: u16 = 1;
pub const MAX_VOLUME: u16 = 500;

type Slot = Arc<Mutex<Option<MusicSession>>>;

/// Who issued a music command and where.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invoker {
    pub guild_id: u64,
    pub user_id: u64,
    /// Text channel the command was used in
    pub channel_id: u64,
}

/// Snapshot of what a guild is playing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlaying {
    pub track: Track,
    pub paused: bool,
    pub looping: bool,
    pub volume: u16,
    pub filters: Vec<FilterLabel>,
}

pub struct SessionRegistry {
    ctx: MusicContext,
    db: DatabaseConnection,
    slots: DashMap<u64, Slot>,
    idle_timeout: Duration,
    idle_tick: Duration,
    this: Weak<Self>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(ctx: MusicContext, db: DatabaseConnection) -> Arc<Self> {
        Self::with_idle_policy(ctx, db, IDLE_TIMEOUT, IDLE_TICK)
    }

    #[must_use]
    pub fn with_idle_policy(
        ctx: MusicContext,
        db: DatabaseConnection,
        idle_timeout: Duration,
        idle_tick: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            ctx,
            db,
            slots: DashMap::new(),
            idle_timeout,
            idle_tick,
            this: this.clone(),
        })
    }

    fn slot(&self, guild_id: u64) -> Slot {
        Arc::clone(self.slots.entry(guild_id).or_default().value())
    }

    /// Slot of a guild that already has one. Never inserts.
    fn existing_slot(&self, guild_id: u64) -> Option<Slot> {
        self.slots.get(&guild_id).map(|slot| Arc::clone(slot.value()))
    }

    /// Whether a guild currently has a session.
    pub async fn is_active(&self, guild_id: u64) -> bool {
        match self.existing_slot(guild_id) {
            Some(slot) => slot.lock().await.is_some(),
            None => false,
        }
    }

    /// Reads from a guild's session while holding its lock.
    pub async fn inspect<T>(&self, guild_id: u64, f: impl FnOnce(&MusicSession) -> T) -> Option<T> {
        let slot = self.existing_slot(guild_id)?;
        let guard = slot.lock().await;
        guard.as_ref().map(f)
    }

    /// Number of guilds holding a slot.
    #[must_use]
    pub fn tracked_guilds(&self) -> usize {
        self.slots.len()
    }

    /// Returns the session a command may act on.
    fn controlled<'a>(
        &self,
        guard: &'a mut Option<MusicSession>,
        invoker: Invoker,
    ) -> Result<&'a mut MusicSession> {
        let session = guard.as_mut().ok_or(Error::SessionTerminated)?;
        let user_channel = self
            .ctx
            .voice
            .user_channel(invoker.guild_id, invoker.user_id)
            .ok_or(Error::UserNotInVoice)?;
        if user_channel != session.voice_channel_id() {
            return Err(Error::MustShareChannel);
        }
        session.remember_channel(invoker.channel_id);
        Ok(session)
    }

    /// Returns the guild's session, joining the invoker's voice channel first
    /// when there is none.
    async fn get_or_create<'a>(
        &self,
        guard: &'a mut Option<MusicSession>,
        invoker: Invoker,
    ) -> Result<&'a mut MusicSession> {
        let user_channel = self
            .ctx
            .voice
            .user_channel(invoker.guild_id, invoker.user_id)
            .ok_or(Error::UserNotInVoice)?;

        match guard.as_ref() {
            Some(existing) if existing.voice_channel_id() != user_channel => {
                return Err(Error::MustShareChannel);
            }
            Some(_) => {}
            None => {
                let session = self.create_session(invoker, user_channel).await?;
                *guard = Some(session);
            }
        }

        let session = guard.as_mut().ok_or(Error::SessionTerminated)?;
        session.remember_channel(invoker.channel_id);
        Ok(session)
    }

    async fn create_session(&self, invoker: Invoker, channel_id: u64) -> Result<MusicSession> {
        let guild_id = invoker.guild_id;
        let server = self.ctx.voice.connect(guild_id, channel_id).await?;

        if let Err(e) = self.ctx.relay.bind_voice(guild_id, &server).await {
            if let Err(disconnect_err) = self.ctx.voice.disconnect(guild_id).await {
                warn!(guild_id, "Failed to leave voice after relay error: {disconnect_err}");
            }
            return Err(e);
        }

        let alerts = music_settings::alerts_enabled(&self.db, guild_id)
            .await
            .unwrap_or_else(|e| {
                warn!(guild_id, "Failed to load alert preference: {e}");
                true
            });

        let mut session =
            MusicSession::new(guild_id, server.channel_id, Some(invoker.channel_id), alerts);
        self.arm_idle(&mut session);
        info!(guild_id, channel_id = server.channel_id, "Music session created");
        Ok(session)
    }

    fn arm_idle(&self, session: &mut MusicSession) {
        let Some(generation) = session.arm_idle(Instant::now(), self.idle_timeout) else {
            return;
        };
        let Some(this) = self.this.upgrade() else {
            return;
        };
        let guild_id = session.guild_id();
        debug!(guild_id, generation, "Idle countdown armed");
        tokio::spawn(async move { this.watch_idle(guild_id, generation).await });
    }

    /// Ticks until the countdown `generation` is cancelled, superseded or expires.
    async fn watch_idle(self: Arc<Self>, guild_id: u64, generation: u64) {
        loop {
            tokio::time::sleep(self.idle_tick).await;

            let Some(slot) = self.existing_slot(guild_id) else {
                return;
            };
            let mut guard = slot.lock().await;
            let Some(session) = guard.as_mut() else {
                return;
            };
            let Some(countdown) = session.idle_countdown() else {
                return;
            };
            if countdown.generation != generation {
                return;
            }

            let listeners = self
                .ctx
                .voice
                .member_count(guild_id, session.voice_channel_id());
            if listeners > 1 {
                debug!(guild_id, "Listeners present, idle countdown cancelled");
                session.cancel_idle();
                return;
            }

            if Instant::now() >= countdown.deadline {
                info!(guild_id, "Idle timeout reached");
                self.terminate(&mut guard, DisconnectReason::Idle).await;
                return;
            }
        }
    }

    /// Removes the session, drops the remote player and leaves voice.
    async fn terminate(&self, guard: &mut Option<MusicSession>, reason: DisconnectReason) {
        let Some(mut session) = guard.take() else {
            return;
        };
        let guild_id = session.guild_id();
        session.terminate();

        if let Err(e) = self.ctx.relay.destroy(guild_id).await {
            warn!(guild_id, "Failed to destroy relay player: {e}");
        }
        if let Err(e) = self.ctx.voice.disconnect(guild_id).await {
            warn!(guild_id, "Failed to leave voice: {e}");
        }

        if reason != DisconnectReason::Requested {
            self.ctx
                .publisher
                .alert(
                    session.last_command_channel(),
                    session.alerts_enabled(),
                    &Notification::Disconnected(reason),
                )
                .await;
        }
        info!(guild_id, ?reason, "Music session terminated");
    }

    /// Joins the invoker's voice channel. Returns the channel id.
    #[instrument(skip(self))]
    pub async fn join(&self, invoker: Invoker) -> Result<u64> {
        let slot = self.slot(invoker.guild_id);
        let mut guard = slot.lock().await;
        let session = self.get_or_create(&mut guard, invoker).await?;
        Ok(session.voice_channel_id())
    }

    /// Resolves `query` and enqueues the result, joining voice if needed.
    ///
    /// The guild lock is held across resolution so that plays start in the
    /// order they were submitted.
    #[instrument(skip(self))]
    pub async fn play(
        &self,
        invoker: Invoker,
        query: &str,
        hint: SearchHint,
    ) -> Result<EnqueueOutcome> {
        if self
            .ctx
            .voice
            .user_channel(invoker.guild_id, invoker.user_id)
            .is_none()
        {
            return Err(Error::UserNotInVoice);
        }

        let slot = self.slot(invoker.guild_id);
        let mut guard = slot.lock().await;

        let (title, tracks) = match self.ctx.relay.resolve(query, hint).await? {
            LoadResult::Playlist { name, tracks } => (Some(name), tracks),
            other => (None, other.into_tracks()),
        };
        if tracks.is_empty() {
            return Err(Error::NoResults {
                query: query.to_string(),
            });
        }
        debug!(count = tracks.len(), playlist = ?title, "Resolved query");

        let session = self.get_or_create(&mut guard, invoker).await?;
        session.enqueue(&self.ctx, tracks).await
    }

    /// Enqueues already resolved tracks as one batch.
    pub async fn enqueue_tracks(
        &self,
        invoker: Invoker,
        tracks: Vec<Track>,
    ) -> Result<EnqueueOutcome> {
        let slot = self.slot(invoker.guild_id);
        let mut guard = slot.lock().await;
        let session = self.get_or_create(&mut guard, invoker).await?;
        session.enqueue(&self.ctx, tracks).await
    }

    /// Resolves every favorite of `user_id` in order and enqueues them together.
    ///
    /// Favorites that fail to resolve are skipped. Like [`Self::play`], the
    /// guild lock is held while resolving.
    pub async fn play_favorites(&self, invoker: Invoker) -> Result<EnqueueOutcome> {
        let saved = favorites::list_favorites(&self.db, invoker.user_id).await?;
        if saved.is_empty() {
            return Err(Error::NoResults {
                query: "favorites".to_string(),
            });
        }

        let slot = self.slot(invoker.guild_id);
        let mut guard = slot.lock().await;

        let mut tracks = Vec::with_capacity(saved.len());
        for favorite in &saved {
            match self
                .ctx
                .relay
                .resolve(&favorite.url, SearchHint::UrlPassthrough)
                .await
            {
                Ok(result) => tracks.extend(result.into_tracks()),
                Err(e) => warn!(title = %favorite.title, "Failed to resolve favorite: {e}"),
            }
        }
        if tracks.is_empty() {
            return Err(Error::NoResults {
                query: "favorites".to_string(),
            });
        }

        let session = self.get_or_create(&mut guard, invoker).await?;
        session.enqueue(&self.ctx, tracks).await
    }

    pub async fn pause(&self, invoker: Invoker) -> Result<Notification> {
        let slot = self.slot(invoker.guild_id);
        let mut guard = slot.lock().await;
        self.controlled(&mut guard, invoker)?
            .pause(&self.ctx)
            .await?;
        Ok(Notification::Paused)
    }

    pub async fn resume(&self, invoker: Invoker) -> Result<Notification> {
        let slot = self.slot(invoker.guild_id);
        let mut guard = slot.lock().await;
        self.controlled(&mut guard, invoker)?
            .resume(&self.ctx)
            .await?;
        Ok(Notification::Resumed)
    }

    /// Skips the current track and waits until the relay confirms it.
    #[instrument(skip(self))]
    pub async fn skip(&self, invoker: Invoker) -> Result<Notification> {
        let pending = {
            let slot = self.slot(invoker.guild_id);
            let mut guard = slot.lock().await;
            self.controlled(&mut guard, invoker)?
                .begin_skip(&self.ctx)
                .await?
        };

        let next = pending.await.map_err(|_| Error::SessionTerminated)?;
        Ok(Notification::Skipped { next })
    }

    pub async fn stop_all(&self, invoker: Invoker) -> Result<Notification> {
        let slot = self.slot(invoker.guild_id);
        let mut guard = slot.lock().await;
        let session = self.controlled(&mut guard, invoker)?;
        session.stop_all(&self.ctx).await?;
        self.arm_idle(session);
        Ok(Notification::Stopped)
    }

    pub async fn set_loop(&self, invoker: Invoker, looping: bool) -> Result<Notification> {
        let slot = self.slot(invoker.guild_id);
        let mut guard = slot.lock().await;
        self.controlled(&mut guard, invoker)?.set_loop(looping);
        Ok(Notification::LoopChanged(looping))
    }

    pub async fn set_volume(&self, invoker: Invoker, volume: u16) -> Result<Notification> {
        if !(MIN_VOLUME..=MAX_VOLUME).contains(&volume) {
            return Err(Error::InvalidInput {
                message: format!("Volume must be between {MIN_VOLUME} and {MAX_VOLUME}"),
            });
        }
        let slot = self.slot(invoker.guild_id);
        let mut guard = slot.lock().await;
        self.controlled(&mut guard, invoker)?
            .set_volume(&self.ctx, volume)
            .await?;
        Ok(Notification::VolumeChanged(volume))
    }

    pub async fn add_filter(&self, invoker: Invoker, label: &str) -> Result<Notification> {
        let label: FilterLabel = label.parse()?;
        let slot = self.slot(invoker.guild_id);
        let mut guard = slot.lock().await;
        self.controlled(&mut guard, invoker)?
            .add_filter(&self.ctx, label)
            .await?;
        Ok(Notification::FilterAdded(label))
    }

    pub async fn remove_filter(&self, invoker: Invoker, label: &str) -> Result<Notification> {
        let label: FilterLabel = label.parse()?;
        let slot = self.slot(invoker.guild_id);
        let mut guard = slot.lock().await;
        self.controlled(&mut guard, invoker)?
            .remove_filter(&self.ctx, label)
            .await?;
        Ok(Notification::FilterRemoved(label))
    }

    pub async fn queue_view(&self, invoker: Invoker) -> Result<Notification> {
        let slot = self.slot(invoker.guild_id);
        let mut guard = slot.lock().await;
        Ok(self.controlled(&mut guard, invoker)?.queue_view())
    }

    pub async fn now_playing(&self, invoker: Invoker) -> Result<NowPlaying> {
        let slot = self.slot(invoker.guild_id);
        let mut guard = slot.lock().await;
        let session = self.controlled(&mut guard, invoker)?;
        let track = session.current().cloned().ok_or(Error::NothingPlaying)?;
        Ok(NowPlaying {
            track,
            paused: session.is_paused(),
            looping: session.is_looping(),
            volume: session.volume(),
            filters: session.active_filters(),
        })
    }

    /// Ends the guild's session on request.
    #[instrument(skip(self))]
    pub async fn leave(&self, invoker: Invoker) -> Result<Notification> {
        let slot = self.slot(invoker.guild_id);
        let mut guard = slot.lock().await;
        self.controlled(&mut guard, invoker)?;
        self.terminate(&mut guard, DisconnectReason::Requested).await;
        Ok(Notification::Disconnected(DisconnectReason::Requested))
    }

    /// Ends the guild's session regardless of who asks. Used on shutdown.
    pub async fn destroy(&self, guild_id: u64) {
        let Some(slot) = self.existing_slot(guild_id) else {
            return;
        };
        let mut guard = slot.lock().await;
        self.terminate(&mut guard, DisconnectReason::Requested).await;
    }

    /// Ends every session.
    pub async fn destroy_all(&self) {
        let guilds: Vec<u64> = self.slots.iter().map(|entry| *entry.key()).collect();
        for guild_id in guilds {
            self.destroy(guild_id).await;
        }
    }

    /// Stores the alert preference and applies it to a live session.
    pub async fn set_alerts(&self, guild_id: u64, enabled: bool) -> Result<()> {
        music_settings::set_alerts(&self.db, guild_id, enabled).await?;
        if let Some(slot) = self.existing_slot(guild_id) {
            if let Some(session) = slot.lock().await.as_mut() {
                session.set_alerts_enabled(enabled);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MusicEventHandler for SessionRegistry {
    async fn on_track_end(&self, guild_id: u64, track: &Track, reason: TrackEndReason) {
        let Some(slot) = self.existing_slot(guild_id) else {
            return;
        };
        let mut guard = slot.lock().await;
        let Some(session) = guard.as_mut() else {
            return;
        };

        let outcome = session.on_track_end(&self.ctx, track, reason).await;
        if outcome == TrackEndOutcome::Idle {
            self.arm_idle(session);
        }
    }

    async fn on_voice_state_changed(&self, guild_id: u64, _channel_id: Option<u64>) {
        let Some(slot) = self.existing_slot(guild_id) else {
            return;
        };
        let mut guard = slot.lock().await;
        let Some(session) = guard.as_mut() else {
            return;
        };

        match self.ctx.voice.current_channel(guild_id) {
            None => {
                self.terminate(&mut guard, DisconnectReason::ChannelLeft)
                    .await;
                return;
            }
            Some(channel_id) if channel_id != session.voice_channel_id() => {
                debug!(guild_id, channel_id, "Bot moved to another voice channel");
                session.set_voice_channel(channel_id);
            }
            Some(_) => {}
        }

        let members = self
            .ctx
            .voice
            .member_count(guild_id, session.voice_channel_id());
        if members <= 1 {
            self.arm_idle(session);
        } else {
            session.cancel_idle();
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{
        core::favorites::add_favorite,
        music::session::SessionState,
        test_utils::*,
    };

    #[tokio::test]
    async fn test_play_single_track_on_idle_session() -> Result<()> {
        let h = music_harness().await?;
        h.relay.set_result("song", LoadResult::Tracks(vec![track(1)]));

        let outcome = h.registry.play(h.invoker(), "song", SearchHint::Youtube).await?;
        assert!(matches!(outcome, EnqueueOutcome::Started { queued: 0, .. }));

        let state = h.registry.inspect(GUILD, MusicSession::state).await;
        assert_eq!(state, Some(SessionState::Playing));
        let queue_len = h.registry.inspect(GUILD, |s| s.queue().len()).await;
        assert_eq!(queue_len, Some(0));

        let messages = h.messenger.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, TEXT_CHANNEL);
        assert!(messages[0].1.contains("Now playing"));
        assert!(messages[0].1.contains("Track 1"));
        assert!(messages[0].1.contains("(#1)"));
        Ok(())
    }

    #[tokio::test]
    async fn test_playlist_overflow_is_atomic() -> Result<()> {
        let h = music_harness().await?;
        h.registry.enqueue_tracks(h.invoker(), tracks(1..=96)).await?;
        assert_eq!(h.registry.inspect(GUILD, |s| s.queue().len()).await, Some(95));

        h.relay.set_result(
            "playlist",
            LoadResult::Playlist {
                name: "P".to_string(),
                tracks: tracks(200..210),
            },
        );
        let result = h
            .registry
            .play(h.invoker(), "playlist", SearchHint::UrlPassthrough)
            .await;
        assert!(matches!(
            result,
            Err(Error::QueueFull {
                cap: 100,
                current: 96
            })
        ));
        assert_eq!(h.registry.inspect(GUILD, |s| s.queue().len()).await, Some(95));
        Ok(())
    }

    #[tokio::test]
    async fn test_skip_with_loop_on_is_rejected() -> Result<()> {
        let h = music_harness().await?;
        h.registry.enqueue_tracks(h.invoker(), vec![track(1)]).await?;
        h.registry.set_loop(h.invoker(), true).await?;

        let result = h.registry.skip(h.invoker()).await;
        assert!(matches!(result, Err(Error::LoopEnabled)));
        let current = h.registry.inspect(GUILD, |s| s.current().cloned()).await;
        assert_eq!(current, Some(Some(track(1))));
        Ok(())
    }

    #[tokio::test]
    async fn test_skip_waits_for_relay() -> Result<()> {
        let h = music_harness().await?;
        h.registry
            .enqueue_tracks(h.invoker(), vec![track(1), track(2)])
            .await?;

        let ack = h.registry.skip(h.invoker()).await?;
        assert_eq!(ack, Notification::Skipped {
            next: Some(track(2))
        });

        let ack = h.registry.skip(h.invoker()).await?;
        assert_eq!(ack, Notification::Skipped { next: None });
        let state = h.registry.inspect(GUILD, MusicSession::state).await;
        assert_eq!(state, Some(SessionState::Idle));
        Ok(())
    }

    #[tokio::test]
    async fn test_channel_preconditions() -> Result<()> {
        let h = music_harness().await?;
        let stranger = Invoker {
            user_id: OTHER_USER,
            ..h.invoker()
        };

        let result = h.registry.pause(h.invoker()).await;
        assert!(matches!(result, Err(Error::SessionTerminated)));

        let result = h.registry.join(stranger).await;
        assert!(matches!(result, Err(Error::UserNotInVoice)));

        h.registry.join(h.invoker()).await?;
        h.voice.set_user_channel(GUILD, OTHER_USER, Some(OTHER_VOICE));
        let result = h.registry.set_loop(stranger, true).await;
        assert!(matches!(result, Err(Error::MustShareChannel)));
        let result = h.registry.join(stranger).await;
        assert!(matches!(result, Err(Error::MustShareChannel)));
        Ok(())
    }

    #[tokio::test]
    async fn test_leave_then_commands_see_terminated() -> Result<()> {
        let h = music_harness().await?;
        h.registry.enqueue_tracks(h.invoker(), vec![track(1)]).await?;
        h.registry.leave(h.invoker()).await?;

        assert_eq!(h.voice.disconnects(), 1);
        assert!(!h.registry.is_active(GUILD).await);
        let result = h.registry.skip(h.invoker()).await;
        assert!(matches!(result, Err(Error::SessionTerminated)));

        // A new play creates a fresh session
        h.registry.enqueue_tracks(h.invoker(), vec![track(2)]).await?;
        let current = h.registry.inspect(GUILD, |s| s.current().cloned()).await;
        assert_eq!(current, Some(Some(track(2))));
        Ok(())
    }

    #[tokio::test]
    async fn test_volume_and_filter_validation() -> Result<()> {
        let h = music_harness().await?;
        h.registry.join(h.invoker()).await?;

        let result = h.registry.set_volume(h.invoker(), 501).await;
        assert!(matches!(result, Err(Error::InvalidInput { .. })));
        h.registry.set_volume(h.invoker(), 500).await?;

        let result = h.registry.add_filter(h.invoker(), "reverb").await;
        assert!(matches!(result, Err(Error::FilterUnknown { .. })));
        h.registry.add_filter(h.invoker(), "8d").await?;
        h.registry.remove_filter(h.invoker(), "8d").await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_play_favorites_skips_unresolvable() -> Result<()> {
        let h = music_harness().await?;
        for n in [1, 2, 3] {
            add_favorite(&h.db, USER, track(n).to_favorite()).await?;
        }
        h.relay.set_result(&track(1).to_favorite().url, LoadResult::Tracks(vec![track(1)]));
        h.relay.set_result(&track(3).to_favorite().url, LoadResult::Tracks(vec![track(3)]));

        let outcome = h.registry.play_favorites(h.invoker()).await?;
        assert!(matches!(outcome, EnqueueOutcome::Started { queued: 1, .. }));
        let queue: Option<Vec<Track>> = h
            .registry
            .inspect(GUILD, |s| s.queue().iter().cloned().collect())
            .await;
        assert_eq!(queue, Some(vec![track(3)]));
        Ok(())
    }

    #[tokio::test]
    async fn test_natural_advance_alert_can_be_disabled() -> Result<()> {
        let h = music_harness().await?;
        h.registry
            .enqueue_tracks(h.invoker(), vec![track(1), track(2)])
            .await?;
        h.registry.set_alerts(GUILD, false).await?;

        h.relay.finish(GUILD);
        settle().await;

        let current = h.registry.inspect(GUILD, |s| s.current().cloned()).await;
        assert_eq!(current, Some(Some(track(2))));
        assert_eq!(h.messenger.messages().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_idle_disconnect_after_timeout() -> Result<()> {
        let h = music_harness().await?;
        h.registry.enqueue_tracks(h.invoker(), vec![track(1)]).await?;
        tokio::time::pause();

        h.voice.set_user_channel(GUILD, USER, None);
        h.voice_changed();
        h.relay.finish(GUILD);
        settle().await;
        assert_eq!(
            h.registry.inspect(GUILD, MusicSession::state).await,
            Some(SessionState::Idle)
        );

        tokio::time::sleep(Duration::from_secs(149)).await;
        assert_eq!(h.voice.disconnects(), 0);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(h.voice.disconnects(), 1);
        assert!(!h.registry.is_active(GUILD).await);

        let disconnected = h
            .messenger
            .messages()
            .iter()
            .filter(|(_, text)| text.contains("idle"))
            .count();
        assert_eq!(disconnected, 1);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(h.voice.disconnects(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_listener_returning_resets_countdown() -> Result<()> {
        let h = music_harness().await?;
        h.registry.enqueue_tracks(h.invoker(), vec![track(1)]).await?;
        tokio::time::pause();

        h.voice.set_user_channel(GUILD, USER, None);
        h.voice_changed();
        settle().await;

        tokio::time::sleep(Duration::from_secs(145)).await;
        h.voice.set_user_channel(GUILD, USER, Some(VOICE_CHANNEL));
        h.voice_changed();
        settle().await;

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.voice.disconnects(), 0);

        h.voice.set_user_channel(GUILD, USER, None);
        h.voice_changed();
        settle().await;

        tokio::time::sleep(Duration::from_secs(140)).await;
        assert_eq!(h.voice.disconnects(), 0);
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(h.voice.disconnects(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_bot_removed_from_voice_terminates() -> Result<()> {
        let h = music_harness().await?;
        h.registry.enqueue_tracks(h.invoker(), vec![track(1)]).await?;

        h.voice.kick_bot(GUILD);
        h.voice_changed();
        settle().await;

        assert!(!h.registry.is_active(GUILD).await);
        assert_eq!(h.relay.calls(GUILD).last().map(String::as_str), Some("destroy"));
        Ok(())
    }

    #[tokio::test]
    async fn test_plays_start_in_submission_order() -> Result<()> {
        let h = music_harness().await?;
        h.relay.set_result("slow", LoadResult::Tracks(vec![track(1)]));
        h.relay.set_result("fast", LoadResult::Tracks(vec![track(2)]));
        h.relay.set_delay("slow", Duration::from_millis(200));

        let first = {
            let registry = Arc::clone(&h.registry);
            let invoker = h.invoker();
            tokio::spawn(async move { registry.play(invoker, "slow", SearchHint::Youtube).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = h.registry.play(h.invoker(), "fast", SearchHint::Youtube).await?;
        let first = first.await.unwrap()?;

        assert!(matches!(first, EnqueueOutcome::Started { .. }));
        assert!(matches!(second, EnqueueOutcome::Queued { position: 2, .. }));
        assert_eq!(h.relay.played(GUILD), vec!["Track 1"]);
        let queue: Option<Vec<Track>> = h
            .registry
            .inspect(GUILD, |s| s.queue().iter().cloned().collect())
            .await;
        assert_eq!(queue, Some(vec![track(2)]));
        Ok(())
    }

    #[tokio::test]
    async fn test_replay_after_stop_survives_late_stopped_event() -> Result<()> {
        let h = music_harness().await?;
        h.registry.enqueue_tracks(h.invoker(), vec![track(1)]).await?;
        h.registry.stop_all(h.invoker()).await?;
        h.registry
            .enqueue_tracks(h.invoker(), vec![track(1), track(2)])
            .await?;
        settle().await;

        let current = h.registry.inspect(GUILD, |s| s.current().cloned()).await;
        assert_eq!(current, Some(Some(track(1))));
        assert_eq!(h.relay.played(GUILD), vec!["Track 1", "Track 1"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_lookups_of_unknown_guilds_keep_no_state() {
        let h = music_harness().await.unwrap();
        assert!(!h.registry.is_active(GUILD + 1).await);
        assert_eq!(h.registry.inspect(GUILD + 2, MusicSession::state).await, None);
        h.registry.destroy(GUILD + 3).await;
        assert_eq!(h.registry.tracked_guilds(), 0);
    }
}
