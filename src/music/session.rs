//! Per-guild music session state machine.
//!
//! A session owns the queue, the current track, the loop and pause flags, the
//! active filters and the idle countdown of one guild. It never reaches the
//! registry directly; relay, voice and publisher are passed in through a
//! [`MusicContext`] so sessions hold no back-references.

use super::{
    filters::{FilterLabel, FilterSpec},
    notify::{Notification, NotificationPublisher, QUEUE_VIEW_LEN},
    relay::RelayClient,
    track::{Track, TrackEndReason},
    voice::VoiceGateway,
};
use crate::errors::{Error, Result};
use std::{
    collections::{BTreeMap, VecDeque},
    sync::Arc,
    time::Duration,
};
use tokio::{sync::oneshot, time::Instant};
use tracing::{debug, warn};

/// Most tracks a session holds, the current one included.
pub const QUEUE_CAP: usize = 100;
pub const DEFAULT_VOLUME: u16 = 100;

/// Collaborators shared by every session.
#[derive(Clone)]
pub struct MusicContext {
    pub relay: Arc<dyn RelayClient>,
    pub voice: Arc<dyn VoiceGateway>,
    pub publisher: NotificationPublisher,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Playing,
    Paused,
    /// Waiting for the relay to confirm a skip
    Draining,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleCountdown {
    pub deadline: Instant,
    pub generation: u64,
}

/// What an enqueue did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The session was idle and the first track started
    Started { track: Track, queued: usize },
    /// Tracks were appended behind the current one
    Queued {
        first: Track,
        count: usize,
        position: usize,
        total_length: u64,
    },
}

/// What a track end did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackEndOutcome {
    Ignored,
    Replayed,
    Advanced(Track),
    /// Nothing left to play
    Idle,
}

pub struct MusicSession {
    guild_id: u64,
    voice_channel_id: u64,
    last_command_channel: Option<u64>,
    current: Option<Track>,
    queue: VecDeque<Track>,
    looping: bool,
    paused: bool,
    draining: bool,
    volume: u16,
    filters: BTreeMap<FilterLabel, FilterSpec>,
    alerts_enabled: bool,
    idle: Option<IdleCountdown>,
    idle_generation: u64,
    pending_skip: Option<oneshot::Sender<Option<Track>>>,
}

impl MusicSession {
    #[must_use]
    pub fn new(
        guild_id: u64,
        voice_channel_id: u64,
        last_command_channel: Option<u64>,
        alerts_enabled: bool,
    ) -> Self {
        Self {
            guild_id,
            voice_channel_id,
            last_command_channel,
            current: None,
            queue: VecDeque::new(),
            looping: false,
            paused: false,
            draining: false,
            volume: DEFAULT_VOLUME,
            filters: BTreeMap::new(),
            alerts_enabled,
            idle: None,
            idle_generation: 0,
            pending_skip: None,
        }
    }

    #[must_use]
    pub const fn guild_id(&self) -> u64 {
        self.guild_id
    }

    #[must_use]
    pub const fn voice_channel_id(&self) -> u64 {
        self.voice_channel_id
    }

    pub const fn set_voice_channel(&mut self, channel_id: u64) {
        self.voice_channel_id = channel_id;
    }

    #[must_use]
    pub const fn last_command_channel(&self) -> Option<u64> {
        self.last_command_channel
    }

    pub const fn remember_channel(&mut self, channel_id: u64) {
        self.last_command_channel = Some(channel_id);
    }

    #[must_use]
    pub const fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    #[must_use]
    pub const fn queue(&self) -> &VecDeque<Track> {
        &self.queue
    }

    #[must_use]
    pub const fn is_looping(&self) -> bool {
        self.looping
    }

    #[must_use]
    pub const fn is_paused(&self) -> bool {
        self.paused
    }

    #[must_use]
    pub const fn volume(&self) -> u16 {
        self.volume
    }

    #[must_use]
    pub fn active_filters(&self) -> Vec<FilterLabel> {
        self.filters.keys().copied().collect()
    }

    #[must_use]
    pub const fn alerts_enabled(&self) -> bool {
        self.alerts_enabled
    }

    pub const fn set_alerts_enabled(&mut self, enabled: bool) {
        self.alerts_enabled = enabled;
    }

    #[must_use]
    pub const fn idle_countdown(&self) -> Option<IdleCountdown> {
        self.idle
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        if self.draining {
            SessionState::Draining
        } else if self.current.is_none() {
            SessionState::Idle
        } else if self.paused {
            SessionState::Paused
        } else {
            SessionState::Playing
        }
    }

    /// Tracks held by the session, the current one included.
    #[must_use]
    pub fn occupied(&self) -> usize {
        self.queue.len() + usize::from(self.current.is_some())
    }

    /// Starts the idle countdown unless one is already running.
    ///
    /// Returns the generation of a newly armed countdown so the caller can
    /// watch it.
    pub fn arm_idle(&mut self, now: Instant, timeout: Duration) -> Option<u64> {
        if self.idle.is_some() {
            return None;
        }
        self.idle_generation += 1;
        self.idle = Some(IdleCountdown {
            deadline: now + timeout,
            generation: self.idle_generation,
        });
        Some(self.idle_generation)
    }

    pub const fn cancel_idle(&mut self) {
        self.idle = None;
    }

    /// Adds tracks, starting the first one if nothing is playing.
    ///
    /// The batch is rejected as a whole when it would exceed [`QUEUE_CAP`].
    pub async fn enqueue(
        &mut self,
        ctx: &MusicContext,
        tracks: Vec<Track>,
    ) -> Result<EnqueueOutcome> {
        let occupied = self.occupied();
        if occupied + tracks.len() > QUEUE_CAP {
            return Err(Error::QueueFull {
                cap: QUEUE_CAP,
                current: occupied,
            });
        }

        let mut tracks = VecDeque::from(tracks);
        let Some(first) = tracks.front().cloned() else {
            return Err(Error::InvalidInput {
                message: "Nothing to enqueue".to_string(),
            });
        };

        if self.current.is_none() {
            tracks.pop_front();
            ctx.relay.play(self.guild_id, &first).await?;
            self.current = Some(first.clone());
            self.paused = false;
            let queued = tracks.len();
            self.queue.extend(tracks);
            self.cancel_idle();

            ctx.publisher
                .announce(
                    self.last_command_channel,
                    &Notification::NowPlaying {
                        track: first.clone(),
                        position: 1,
                    },
                )
                .await;
            return Ok(EnqueueOutcome::Started {
                track: first,
                queued,
            });
        }

        let count = tracks.len();
        let total_length = tracks.iter().map(|t| t.info.length).sum();
        self.queue.extend(tracks);
        Ok(EnqueueOutcome::Queued {
            first,
            count,
            position: occupied + 1,
            total_length,
        })
    }

    pub async fn pause(&mut self, ctx: &MusicContext) -> Result<()> {
        if self.current.is_none() {
            return Err(Error::NothingPlaying);
        }
        if self.paused {
            return Err(Error::AlreadyPaused);
        }
        ctx.relay.pause(self.guild_id).await?;
        self.paused = true;
        Ok(())
    }

    pub async fn resume(&mut self, ctx: &MusicContext) -> Result<()> {
        if self.current.is_none() {
            return Err(Error::NothingPlaying);
        }
        if !self.paused {
            return Err(Error::NotPaused);
        }
        ctx.relay.resume(self.guild_id).await?;
        self.paused = false;
        Ok(())
    }

    /// Asks the relay to stop the current track.
    ///
    /// The returned receiver resolves with the next track once the relay's
    /// `stopped` event has been handled, or errors if the session ends first.
    pub async fn begin_skip(
        &mut self,
        ctx: &MusicContext,
    ) -> Result<oneshot::Receiver<Option<Track>>> {
        if self.looping {
            return Err(Error::LoopEnabled);
        }
        if self.current.is_none() {
            return Err(Error::NothingPlaying);
        }
        if self.draining {
            return Err(Error::SkipInProgress);
        }

        let (tx, rx) = oneshot::channel();
        self.draining = true;
        self.pending_skip = Some(tx);
        if let Err(e) = ctx.relay.stop(self.guild_id).await {
            self.draining = false;
            self.pending_skip = None;
            return Err(e);
        }
        Ok(rx)
    }

    /// Applies a relay track end.
    ///
    /// Ends of tracks other than the current one and ends caused by replacement
    /// or load failures leave the session untouched. A `stopped` end only
    /// counts while a skip is pending; a late one left over from `stop_all`
    /// would otherwise drop a replay of the same track. Relay errors while
    /// advancing are logged and the failing track is skipped.
    pub async fn on_track_end(
        &mut self,
        ctx: &MusicContext,
        track: &Track,
        reason: TrackEndReason,
    ) -> TrackEndOutcome {
        let is_current = self
            .current
            .as_ref()
            .is_some_and(|current| current.encoded == track.encoded);
        if !is_current {
            return TrackEndOutcome::Ignored;
        }
        if !reason.advances_queue() || (reason == TrackEndReason::Stopped && !self.draining) {
            debug!(guild_id = self.guild_id, ?reason, "Ignoring track end");
            return TrackEndOutcome::Ignored;
        }

        if reason == TrackEndReason::Finished && self.looping {
            match ctx.relay.play(self.guild_id, track).await {
                Ok(()) => return TrackEndOutcome::Replayed,
                Err(e) => warn!(guild_id = self.guild_id, "Failed to replay looped track: {e}"),
            }
        }

        self.draining = false;
        self.paused = false;
        self.current = None;

        while let Some(next) = self.queue.pop_front() {
            if let Err(e) = ctx.relay.play(self.guild_id, &next).await {
                warn!(guild_id = self.guild_id, track = next.title(), "Failed to start track: {e}");
                continue;
            }
            self.current = Some(next.clone());
            self.cancel_idle();
            self.resolve_skip(Some(next.clone()));

            ctx.publisher
                .alert(
                    self.last_command_channel,
                    self.alerts_enabled,
                    &Notification::NowPlaying {
                        track: next.clone(),
                        position: 1,
                    },
                )
                .await;
            return TrackEndOutcome::Advanced(next);
        }

        self.resolve_skip(None);
        TrackEndOutcome::Idle
    }

    fn resolve_skip(&mut self, next: Option<Track>) {
        if let Some(tx) = self.pending_skip.take() {
            // The skipping command may have gone away
            let _ = tx.send(next);
        }
    }

    /// Clears the queue and stops the current track.
    pub async fn stop_all(&mut self, ctx: &MusicContext) -> Result<()> {
        if self.current.is_some() {
            ctx.relay.stop(self.guild_id).await?;
        }
        self.queue.clear();
        self.current = None;
        self.paused = false;
        self.draining = false;
        self.resolve_skip(None);
        Ok(())
    }

    /// Looping never interrupts the current track.
    pub const fn set_loop(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub async fn set_volume(&mut self, ctx: &MusicContext, volume: u16) -> Result<()> {
        ctx.relay.set_volume(self.guild_id, volume).await?;
        self.volume = volume;
        Ok(())
    }

    /// Enables a filter, replacing an active one with the same label.
    pub async fn add_filter(&mut self, ctx: &MusicContext, label: FilterLabel) -> Result<()> {
        let spec = label.spec();
        ctx.relay.add_filter(self.guild_id, label, &spec).await?;
        self.filters.insert(label, spec);
        Ok(())
    }

    pub async fn remove_filter(&mut self, ctx: &MusicContext, label: FilterLabel) -> Result<()> {
        if !self.filters.contains_key(&label) {
            return Err(Error::FilterNotActive {
                label: label.to_string(),
            });
        }
        ctx.relay.remove_filter(self.guild_id, label).await?;
        self.filters.remove(&label);
        Ok(())
    }

    #[must_use]
    pub fn queue_view(&self) -> Notification {
        Notification::QueueView {
            current: self.current.clone(),
            upcoming: self.queue.iter().take(QUEUE_VIEW_LEN).cloned().collect(),
            total: self.queue.len(),
        }
    }

    /// Tears the session down locally. Pending skips observe termination.
    pub fn terminate(&mut self) {
        self.cancel_idle();
        self.pending_skip = None;
        self.queue.clear();
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;

    const GUILD: u64 = 1;

    fn session() -> MusicSession {
        MusicSession::new(GUILD, 100, Some(500), true)
    }

    #[tokio::test]
    async fn test_enqueue_from_idle_starts_head() -> Result<()> {
        let fakes = MusicFakes::new();
        let ctx = fakes.context();
        let mut session = session();
        assert_eq!(session.state(), SessionState::Idle);

        let outcome = session.enqueue(&ctx, vec![track(1), track(2)]).await?;
        assert_eq!(
            outcome,
            EnqueueOutcome::Started {
                track: track(1),
                queued: 1
            }
        );
        assert_eq!(session.state(), SessionState::Playing);
        assert_eq!(session.queue().len(), 1);
        assert_eq!(fakes.relay.played(GUILD), vec!["Track 1"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_exactly_one_hundred_tracks_fit() -> Result<()> {
        let fakes = MusicFakes::new();
        let ctx = fakes.context();
        let mut session = session();

        session.enqueue(&ctx, tracks(1..=100)).await?;
        assert_eq!(session.occupied(), 100);
        assert_eq!(session.queue().len(), 99);

        let result = session.enqueue(&ctx, vec![track(101)]).await;
        assert!(matches!(
            result,
            Err(Error::QueueFull {
                cap: 100,
                current: 100
            })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_loop_replays_finished_track() -> Result<()> {
        let fakes = MusicFakes::new();
        let ctx = fakes.context();
        let mut session = session();
        session.enqueue(&ctx, vec![track(1), track(2)]).await?;
        session.set_loop(true);

        let outcome = session
            .on_track_end(&ctx, &track(1), TrackEndReason::Finished)
            .await;
        assert_eq!(outcome, TrackEndOutcome::Replayed);
        assert_eq!(session.current(), Some(&track(1)));
        assert_eq!(session.queue().len(), 1);
        assert_eq!(fakes.relay.played(GUILD), vec!["Track 1", "Track 1"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_track_end_advances_or_idles() -> Result<()> {
        let fakes = MusicFakes::new();
        let ctx = fakes.context();
        let mut session = session();
        session.enqueue(&ctx, vec![track(1), track(2)]).await?;

        let outcome = session
            .on_track_end(&ctx, &track(1), TrackEndReason::Finished)
            .await;
        assert_eq!(outcome, TrackEndOutcome::Advanced(track(2)));
        // Now playing for the start and the advance
        assert_eq!(fakes.messenger.messages().len(), 2);

        let outcome = session
            .on_track_end(&ctx, &track(2), TrackEndReason::Finished)
            .await;
        assert_eq!(outcome, TrackEndOutcome::Idle);
        assert_eq!(session.state(), SessionState::Idle);
        Ok(())
    }

    #[tokio::test]
    async fn test_advance_respects_alert_preference() -> Result<()> {
        let fakes = MusicFakes::new();
        let ctx = fakes.context();
        let mut session = MusicSession::new(GUILD, 100, Some(500), false);
        session.enqueue(&ctx, vec![track(1), track(2)]).await?;
        session
            .on_track_end(&ctx, &track(1), TrackEndReason::Finished)
            .await;

        // Only the command-driven start is announced
        assert_eq!(fakes.messenger.messages().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_stale_and_replaced_ends_are_ignored() -> Result<()> {
        let fakes = MusicFakes::new();
        let ctx = fakes.context();
        let mut session = session();
        session.enqueue(&ctx, vec![track(1), track(2)]).await?;

        let stale = session
            .on_track_end(&ctx, &track(9), TrackEndReason::Finished)
            .await;
        let replaced = session
            .on_track_end(&ctx, &track(1), TrackEndReason::Replaced)
            .await;
        let failed = session
            .on_track_end(&ctx, &track(1), TrackEndReason::LoadFailed)
            .await;
        assert_eq!(stale, TrackEndOutcome::Ignored);
        assert_eq!(replaced, TrackEndOutcome::Ignored);
        assert_eq!(failed, TrackEndOutcome::Ignored);
        assert_eq!(session.current(), Some(&track(1)));
        Ok(())
    }

    #[tokio::test]
    async fn test_pause_resume_transitions() -> Result<()> {
        let fakes = MusicFakes::new();
        let ctx = fakes.context();
        let mut session = session();
        assert!(matches!(session.pause(&ctx).await, Err(Error::NothingPlaying)));

        session.enqueue(&ctx, vec![track(1)]).await?;
        session.pause(&ctx).await?;
        assert_eq!(session.state(), SessionState::Paused);
        assert!(matches!(session.pause(&ctx).await, Err(Error::AlreadyPaused)));

        session.resume(&ctx).await?;
        assert_eq!(session.state(), SessionState::Playing);
        assert!(matches!(session.resume(&ctx).await, Err(Error::NotPaused)));
        Ok(())
    }

    #[tokio::test]
    async fn test_skip_rejected_while_looping() -> Result<()> {
        let fakes = MusicFakes::new();
        let ctx = fakes.context();
        let mut session = session();
        session.enqueue(&ctx, vec![track(1)]).await?;
        session.set_loop(true);

        let result = session.begin_skip(&ctx).await;
        assert!(matches!(result, Err(Error::LoopEnabled)));
        assert_eq!(session.current(), Some(&track(1)));
        assert!(fakes.relay.calls(GUILD).iter().all(|c| c != "stop"));
        Ok(())
    }

    #[tokio::test]
    async fn test_skip_resolves_on_stopped_end() -> Result<()> {
        let fakes = MusicFakes::new();
        let ctx = fakes.context();
        let mut session = session();
        session.enqueue(&ctx, vec![track(1), track(2)]).await?;

        let rx = session.begin_skip(&ctx).await?;
        assert_eq!(session.state(), SessionState::Draining);
        assert!(matches!(session.begin_skip(&ctx).await, Err(Error::SkipInProgress)));

        session
            .on_track_end(&ctx, &track(1), TrackEndReason::Stopped)
            .await;
        assert_eq!(rx.await.ok().flatten(), Some(track(2)));
        assert_eq!(session.state(), SessionState::Playing);
        Ok(())
    }

    #[tokio::test]
    async fn test_late_stopped_end_ignored_after_stop_all() -> Result<()> {
        let fakes = MusicFakes::new();
        let ctx = fakes.context();
        let mut session = session();
        session.enqueue(&ctx, vec![track(1)]).await?;
        session.stop_all(&ctx).await?;

        session.enqueue(&ctx, vec![track(1), track(2)]).await?;
        // The relay's end for the first play of track 1 arrives late
        let outcome = session
            .on_track_end(&ctx, &track(1), TrackEndReason::Stopped)
            .await;
        assert_eq!(outcome, TrackEndOutcome::Ignored);
        assert_eq!(session.current(), Some(&track(1)));
        assert_eq!(session.queue().len(), 1);
        assert_eq!(fakes.relay.played(GUILD), vec!["Track 1", "Track 1"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_cleanup_end_does_not_advance() -> Result<()> {
        let fakes = MusicFakes::new();
        let ctx = fakes.context();
        let mut session = session();
        session.enqueue(&ctx, vec![track(1), track(2)]).await?;

        let outcome = session
            .on_track_end(&ctx, &track(1), TrackEndReason::Cleanup)
            .await;
        assert_eq!(outcome, TrackEndOutcome::Ignored);
        assert_eq!(session.current(), Some(&track(1)));
        Ok(())
    }

    #[tokio::test]
    async fn test_terminate_cancels_pending_skip() -> Result<()> {
        let fakes = MusicFakes::new();
        let ctx = fakes.context();
        let mut session = session();
        session.enqueue(&ctx, vec![track(1)]).await?;

        let rx = session.begin_skip(&ctx).await?;
        session.terminate();
        assert!(rx.await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_filter_round_trip() -> Result<()> {
        let fakes = MusicFakes::new();
        let ctx = fakes.context();
        let mut session = session();
        session.enqueue(&ctx, vec![track(1)]).await?;

        session.add_filter(&ctx, FilterLabel::Nightcore).await?;
        session.add_filter(&ctx, FilterLabel::Nightcore).await?;
        assert_eq!(session.active_filters(), vec![FilterLabel::Nightcore]);

        session.remove_filter(&ctx, FilterLabel::Nightcore).await?;
        assert!(session.active_filters().is_empty());
        assert!(fakes.relay.active_filters(GUILD).is_empty());
        assert_eq!(session.current(), Some(&track(1)));

        let result = session.remove_filter(&ctx, FilterLabel::EightD).await;
        assert!(matches!(result, Err(Error::FilterNotActive { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_stop_all_clears_everything() -> Result<()> {
        let fakes = MusicFakes::new();
        let ctx = fakes.context();
        let mut session = session();
        session.enqueue(&ctx, tracks(1..=5)).await?;
        session.pause(&ctx).await?;

        session.stop_all(&ctx).await?;
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.queue().is_empty());
        assert!(!session.is_paused());
        Ok(())
    }

    #[test]
    fn test_idle_arming_is_not_restarted() {
        let mut session = session();
        let now = Instant::now();
        let timeout = Duration::from_secs(150);

        assert_eq!(session.arm_idle(now, timeout), Some(1));
        assert_eq!(session.arm_idle(now + Duration::from_secs(10), timeout), None);
        assert_eq!(
            session.idle_countdown().map(|c| c.deadline),
            Some(now + timeout)
        );

        session.cancel_idle();
        assert_eq!(session.arm_idle(now, timeout), Some(2));
    }
}
