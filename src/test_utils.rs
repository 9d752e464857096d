//! Shared test utilities.
//!
//! Provides the in-memory database setup plus in-memory stand-ins for Discord
//! and the audio relay, so core logic runs without a network.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use crate::{
    core::economy,
    errors::{Error, Result},
    music::{
        events::{self, EventDispatcher, EventSender, MusicEvent, MusicEventHandler},
        filters::{FilterLabel, FilterSpec},
        notify::NotificationPublisher,
        registry::{Invoker, SessionRegistry},
        relay::RelayClient,
        session::MusicContext,
        track::{LoadResult, SearchHint, Track, TrackEndReason, TrackInfo},
        voice::{VoiceGateway, VoiceServer},
    },
    platform::{ChannelMessenger, MemberDirectory},
};
use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

pub const GUILD: u64 = 1_000;
pub const USER: u64 = 2_000;
pub const OTHER_USER: u64 = 2_001;
pub const VOICE_CHANNEL: u64 = 3_000;
pub const OTHER_VOICE: u64 = 3_001;
pub const TEXT_CHANNEL: u64 = 4_000;

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// In-memory database with the economy enabled for `guild_id` using defaults.
pub async fn setup_economy_db(guild_id: u64) -> Result<DatabaseConnection> {
    let db = setup_test_db().await?;
    economy::enable_economy(&db, guild_id).await?;
    Ok(db)
}

/// Track `n` with a three minute length.
#[must_use]
pub fn track(n: usize) -> Track {
    Track {
        encoded: format!("encoded-{n}"),
        info: TrackInfo {
            identifier: format!("id-{n}"),
            title: format!("Track {n}"),
            author: "Artist".to_string(),
            length: 180_000,
            is_stream: false,
            uri: Some(format!("https://example.com/track/{n}")),
            artwork_url: None,
            source_name: "test".to_string(),
        },
    }
}

#[must_use]
pub fn tracks(numbers: impl IntoIterator<Item = usize>) -> Vec<Track> {
    numbers.into_iter().map(track).collect()
}

/// Lets spawned tasks drain their channels.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

/// Relay double that records calls and answers `stop` with a `stopped` event.
#[derive(Default)]
pub struct FakeRelay {
    results: Mutex<HashMap<String, LoadResult>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<(u64, String)>>,
    playing: Mutex<HashMap<u64, Track>>,
    played: Mutex<Vec<(u64, String)>>,
    filters: Mutex<HashMap<u64, HashSet<FilterLabel>>>,
    events: Option<EventSender>,
}

impl FakeRelay {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_events(events: EventSender) -> Self {
        Self {
            events: Some(events),
            ..Self::default()
        }
    }

    pub fn set_result(&self, query: &str, result: LoadResult) {
        self.results
            .lock()
            .unwrap()
            .insert(query.to_string(), result);
    }

    /// Makes `resolve(query)` take `delay` before answering.
    pub fn set_delay(&self, query: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(query.to_string(), delay);
    }

    /// Call names in order for one guild.
    pub fn calls(&self, guild_id: u64) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(g, _)| *g == guild_id)
            .map(|(_, c)| c.clone())
            .collect()
    }

    /// Titles passed to `play` in order.
    pub fn played(&self, guild_id: u64) -> Vec<String> {
        self.played
            .lock()
            .unwrap()
            .iter()
            .filter(|(g, _)| *g == guild_id)
            .map(|(_, t)| t.clone())
            .collect()
    }

    pub fn active_filters(&self, guild_id: u64) -> HashSet<FilterLabel> {
        self.filters
            .lock()
            .unwrap()
            .get(&guild_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Ends the playing track as if it ran to completion.
    pub fn finish(&self, guild_id: u64) {
        let ended = self.playing.lock().unwrap().remove(&guild_id);
        if let Some(track) = ended {
            self.emit(guild_id, track, TrackEndReason::Finished);
        }
    }

    fn emit(&self, guild_id: u64, track: Track, reason: TrackEndReason) {
        if let Some(events) = &self.events {
            let _ = events.send(MusicEvent::TrackEnd {
                guild_id,
                track,
                reason,
            });
        }
    }

    fn record(&self, guild_id: u64, call: &str) {
        self.calls
            .lock()
            .unwrap()
            .push((guild_id, call.to_string()));
    }
}

#[async_trait]
impl RelayClient for FakeRelay {
    async fn resolve(&self, query: &str, _hint: SearchHint) -> Result<LoadResult> {
        let delay = self.delays.lock().unwrap().get(query).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.results
            .lock()
            .unwrap()
            .get(query)
            .cloned()
            .ok_or_else(|| Error::ResolveFailed {
                message: format!("no fixture for {query}"),
            })
    }

    async fn bind_voice(&self, guild_id: u64, _server: &VoiceServer) -> Result<()> {
        self.record(guild_id, "bind");
        Ok(())
    }

    async fn play(&self, guild_id: u64, track: &Track) -> Result<()> {
        self.record(guild_id, "play");
        self.played
            .lock()
            .unwrap()
            .push((guild_id, track.info.title.clone()));
        let replaced = self
            .playing
            .lock()
            .unwrap()
            .insert(guild_id, track.clone());
        if let Some(old) = replaced {
            self.emit(guild_id, old, TrackEndReason::Replaced);
        }
        Ok(())
    }

    async fn pause(&self, guild_id: u64) -> Result<()> {
        self.record(guild_id, "pause");
        Ok(())
    }

    async fn resume(&self, guild_id: u64) -> Result<()> {
        self.record(guild_id, "resume");
        Ok(())
    }

    async fn stop(&self, guild_id: u64) -> Result<()> {
        self.record(guild_id, "stop");
        let stopped = self.playing.lock().unwrap().remove(&guild_id);
        if let Some(track) = stopped {
            self.emit(guild_id, track, TrackEndReason::Stopped);
        }
        Ok(())
    }

    async fn set_volume(&self, guild_id: u64, volume: u16) -> Result<()> {
        self.record(guild_id, &format!("volume {volume}"));
        Ok(())
    }

    async fn add_filter(&self, guild_id: u64, label: FilterLabel, _spec: &FilterSpec) -> Result<()> {
        self.record(guild_id, &format!("add {label}"));
        self.filters
            .lock()
            .unwrap()
            .entry(guild_id)
            .or_default()
            .insert(label);
        Ok(())
    }

    async fn remove_filter(&self, guild_id: u64, label: FilterLabel) -> Result<()> {
        self.record(guild_id, &format!("remove {label}"));
        if let Some(active) = self.filters.lock().unwrap().get_mut(&guild_id) {
            active.remove(&label);
        }
        Ok(())
    }

    async fn destroy(&self, guild_id: u64) -> Result<()> {
        self.record(guild_id, "destroy");
        self.playing.lock().unwrap().remove(&guild_id);
        Ok(())
    }
}

/// Voice double with settable membership. The bot is not counted as a user.
#[derive(Default)]
pub struct FakeVoice {
    bot: Mutex<HashMap<u64, u64>>,
    users: Mutex<HashMap<(u64, u64), u64>>,
    disconnects: AtomicUsize,
}

impl FakeVoice {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_user_channel(&self, guild_id: u64, user_id: u64, channel_id: Option<u64>) {
        let mut users = self.users.lock().unwrap();
        match channel_id {
            Some(channel_id) => users.insert((guild_id, user_id), channel_id),
            None => users.remove(&(guild_id, user_id)),
        };
    }

    /// Removes the bot from voice without going through `disconnect`.
    pub fn kick_bot(&self, guild_id: u64) {
        self.bot.lock().unwrap().remove(&guild_id);
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceGateway for FakeVoice {
    async fn connect(&self, guild_id: u64, channel_id: u64) -> Result<VoiceServer> {
        let mut bot = self.bot.lock().unwrap();
        if bot.get(&guild_id).is_some_and(|c| *c != channel_id) {
            return Err(Error::AlreadyConnectedElsewhere);
        }
        bot.insert(guild_id, channel_id);
        Ok(VoiceServer {
            channel_id,
            endpoint: "voice.example.com".to_string(),
            token: "token".to_string(),
            session_id: format!("session-{guild_id}"),
        })
    }

    async fn disconnect(&self, guild_id: u64) -> Result<()> {
        self.bot.lock().unwrap().remove(&guild_id);
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn current_channel(&self, guild_id: u64) -> Option<u64> {
        self.bot.lock().unwrap().get(&guild_id).copied()
    }

    fn user_channel(&self, guild_id: u64, user_id: u64) -> Option<u64> {
        self.users.lock().unwrap().get(&(guild_id, user_id)).copied()
    }

    fn member_count(&self, guild_id: u64, channel_id: u64) -> usize {
        let humans = self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|((g, _), c)| *g == guild_id && **c == channel_id)
            .count();
        let bot = usize::from(self.current_channel(guild_id) == Some(channel_id));
        humans + bot
    }
}

/// Messenger double that keeps every message.
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<(u64, String)>>,
}

impl RecordingMessenger {
    pub fn messages(&self) -> Vec<(u64, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelMessenger for RecordingMessenger {
    async fn send_message(&self, channel_id: u64, content: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((channel_id, content.to_string()));
        Ok(())
    }
}

/// Member directory double backed by a role table.
#[derive(Default)]
pub struct StaticMembers {
    roles: Mutex<HashMap<(u64, u64), Vec<u64>>>,
    granted: Mutex<Vec<(u64, u64, u64)>>,
    fail_grants: bool,
}

impl StaticMembers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failing_role_grants(mut self) -> Self {
        self.fail_grants = true;
        self
    }

    pub fn set_roles(&self, guild_id: u64, user_id: u64, roles: Vec<u64>) {
        self.roles
            .lock()
            .unwrap()
            .insert((guild_id, user_id), roles);
    }

    pub fn granted(&self) -> Vec<(u64, u64, u64)> {
        self.granted.lock().unwrap().clone()
    }
}

#[async_trait]
impl MemberDirectory for StaticMembers {
    async fn role_members(&self, guild_id: u64, role_id: u64) -> Result<Vec<u64>> {
        let mut members: Vec<u64> = self
            .roles
            .lock()
            .unwrap()
            .iter()
            .filter(|((g, _), roles)| *g == guild_id && roles.contains(&role_id))
            .map(|((_, user), _)| *user)
            .collect();
        members.sort_unstable();
        Ok(members)
    }

    async fn member_roles(&self, guild_id: u64, user_id: u64) -> Result<Vec<u64>> {
        Ok(self
            .roles
            .lock()
            .unwrap()
            .get(&(guild_id, user_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn add_role(&self, guild_id: u64, user_id: u64, role_id: u64) -> Result<()> {
        if self.fail_grants {
            return Err(Error::InvalidInput {
                message: "missing permissions".to_string(),
            });
        }
        self.roles
            .lock()
            .unwrap()
            .entry((guild_id, user_id))
            .or_default()
            .push(role_id);
        self.granted
            .lock()
            .unwrap()
            .push((guild_id, user_id, role_id));
        Ok(())
    }
}

/// Fakes behind a [`MusicContext`], without event delivery.
pub struct MusicFakes {
    pub relay: Arc<FakeRelay>,
    pub voice: Arc<FakeVoice>,
    pub messenger: Arc<RecordingMessenger>,
}

impl MusicFakes {
    #[must_use]
    pub fn new() -> Self {
        Self {
            relay: Arc::new(FakeRelay::new()),
            voice: Arc::new(FakeVoice::new()),
            messenger: Arc::new(RecordingMessenger::default()),
        }
    }

    #[must_use]
    pub fn context(&self) -> MusicContext {
        MusicContext {
            relay: Arc::clone(&self.relay) as Arc<dyn RelayClient>,
            voice: Arc::clone(&self.voice) as Arc<dyn VoiceGateway>,
            publisher: NotificationPublisher::new(
                Arc::clone(&self.messenger) as Arc<dyn ChannelMessenger>
            ),
        }
    }
}

/// A registry wired to fakes with a running event dispatcher.
///
/// `USER` sits in `VOICE_CHANNEL` of `GUILD`.
pub struct MusicHarness {
    pub db: DatabaseConnection,
    pub relay: Arc<FakeRelay>,
    pub voice: Arc<FakeVoice>,
    pub messenger: Arc<RecordingMessenger>,
    pub registry: Arc<SessionRegistry>,
    pub events: EventSender,
}

impl MusicHarness {
    #[must_use]
    pub const fn invoker(&self) -> Invoker {
        Invoker {
            guild_id: GUILD,
            user_id: USER,
            channel_id: TEXT_CHANNEL,
        }
    }

    /// Reports a voice-state change in `GUILD`.
    pub fn voice_changed(&self) {
        let _ = self.events.send(MusicEvent::VoiceStateChanged {
            guild_id: GUILD,
            channel_id: Some(VOICE_CHANNEL),
        });
    }
}

pub async fn music_harness() -> Result<MusicHarness> {
    let db = setup_test_db().await?;
    let (events, receiver) = events::channel();

    let relay = Arc::new(FakeRelay::with_events(events.clone()));
    let voice = Arc::new(FakeVoice::new());
    let messenger = Arc::new(RecordingMessenger::default());
    voice.set_user_channel(GUILD, USER, Some(VOICE_CHANNEL));

    let ctx = MusicContext {
        relay: Arc::clone(&relay) as Arc<dyn RelayClient>,
        voice: Arc::clone(&voice) as Arc<dyn VoiceGateway>,
        publisher: NotificationPublisher::new(Arc::clone(&messenger) as Arc<dyn ChannelMessenger>),
    };
    let registry = SessionRegistry::new(ctx, db.clone());

    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(Arc::clone(&registry) as Arc<dyn MusicEventHandler>);
    dispatcher.spawn(receiver);

    Ok(MusicHarness {
        db,
        relay,
        voice,
        messenger,
        registry,
        events,
    })
}
