//! Lavalink v4 node pool implementing [`RelayClient`].
//!
//! Each configured node keeps one websocket open for its session id and for
//! player events, and is driven over REST for everything else. A guild sticks
//! to the node that first served it for as long as that node stays connected.

use super::{
    events::{EventSender, MusicEvent},
    filters::{FilterLabel, FilterSpec, Filters},
    relay::RelayClient,
    track::{LoadResult, SearchHint, Track, TrackEndReason},
    voice::VoiceServer,
};
use crate::{
    config::settings::{LavalinkConfig, NodeConfig},
    errors::{Error, Result},
};
use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::{
    Message,
    client::IntoClientRequest,
    http::{HeaderValue, header::AUTHORIZATION},
};
use tracing::{debug, error, info, instrument, warn};

const CLIENT_NAME: &str = concat!("guildtunes/", env!("CARGO_PKG_VERSION"));

fn rpc_error(e: impl std::fmt::Display) -> Error {
    Error::RelayRpcFailed {
        message: e.to_string(),
    }
}

/// One Lavalink server.
pub struct LavalinkNode {
    config: NodeConfig,
    session_id: RwLock<Option<String>>,
}

impl LavalinkNode {
    #[must_use]
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            session_id: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.config.label
    }

    fn base_url(&self) -> String {
        let scheme = if self.config.secure { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.config.host, self.config.port)
    }

    fn websocket_url(&self) -> String {
        let scheme = if self.config.secure { "wss" } else { "ws" };
        format!(
            "{scheme}://{}:{}/v4/websocket",
            self.config.host, self.config.port
        )
    }

    /// Session id of the live websocket, `None` while disconnected.
    pub async fn session_id(&self) -> Option<String> {
        self.session_id.read().await.clone()
    }

    async fn set_session_id(&self, session_id: Option<String>) {
        *self.session_id.write().await = session_id;
    }

    /// Reads the websocket until it closes.
    async fn listen(&self, user_id: u64, events: &EventSender) -> Result<()> {
        let mut request = self
            .websocket_url()
            .into_client_request()
            .map_err(rpc_error)?;
        let headers = request.headers_mut();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&self.config.password).map_err(rpc_error)?,
        );
        headers.insert("User-Id", HeaderValue::from(user_id));
        headers.insert("Client-Name", HeaderValue::from_static(CLIENT_NAME));

        let (mut stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(rpc_error)?;
        info!(node = %self.config.label, "Connected to Lavalink node");

        while let Some(message) = stream.next().await {
            match message.map_err(rpc_error)? {
                Message::Text(text) => self.handle_message(text.as_str(), events).await,
                Message::Close(frame) => {
                    debug!(node = %self.config.label, ?frame, "Lavalink closed the websocket");
                    break;
                }
                _ => {}
            }
        }
        Ok(())
    }

    async fn handle_message(&self, text: &str, events: &EventSender) {
        match parse_node_message(text) {
            Ok(NodeMessage::Ready { session_id }) => {
                info!(node = %self.config.label, %session_id, "Lavalink session ready");
                self.set_session_id(Some(session_id)).await;
            }
            Ok(NodeMessage::Event(event)) => {
                if events.send(event).is_err() {
                    warn!("Music event channel closed, dropping Lavalink event");
                }
            }
            Ok(NodeMessage::Other) => {}
            Err(e) => warn!(node = %self.config.label, "Unreadable Lavalink message: {e}"),
        }
    }
}

/// The subset of node messages the bot acts on.
#[derive(Debug, PartialEq, Eq)]
enum NodeMessage {
    Ready { session_id: String },
    Event(MusicEvent),
    Other,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadyPayload {
    session_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventPayload {
    #[serde(rename = "type")]
    kind: String,
    guild_id: String,
    #[serde(default)]
    track: Option<Track>,
    #[serde(default)]
    reason: Option<TrackEndReason>,
    #[serde(default)]
    code: Option<u16>,
}

fn parse_node_message(text: &str) -> Result<NodeMessage> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    match value.get("op").and_then(serde_json::Value::as_str) {
        Some("ready") => {
            let ready: ReadyPayload = serde_json::from_value(value)?;
            Ok(NodeMessage::Ready {
                session_id: ready.session_id,
            })
        }
        Some("event") => {
            let event: EventPayload = serde_json::from_value(value)?;
            let Ok(guild_id) = event.guild_id.parse::<u64>() else {
                return Ok(NodeMessage::Other);
            };
            match (event.kind.as_str(), event.track, event.reason) {
                ("TrackEndEvent", Some(track), Some(reason)) => {
                    Ok(NodeMessage::Event(MusicEvent::TrackEnd {
                        guild_id,
                        track,
                        reason,
                    }))
                }
                ("WebSocketClosedEvent", ..) => {
                    warn!(guild_id, code = ?event.code, "Voice websocket closed on the node");
                    Ok(NodeMessage::Other)
                }
                _ => Ok(NodeMessage::Other),
            }
        }
        _ => Ok(NodeMessage::Other),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadResponse {
    load_type: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Deserialize)]
struct PlaylistData {
    info: PlaylistInfo,
    tracks: Vec<Track>,
}

#[derive(Deserialize)]
struct PlaylistInfo {
    name: String,
}

#[derive(Deserialize)]
struct LoadError {
    #[serde(default)]
    message: Option<String>,
}

fn parse_load_response(response: LoadResponse) -> Result<LoadResult> {
    match response.load_type.as_str() {
        "track" => Ok(LoadResult::Tracks(vec![serde_json::from_value(
            response.data,
        )?])),
        "search" => {
            let tracks: Vec<Track> = serde_json::from_value(response.data)?;
            if tracks.is_empty() {
                Ok(LoadResult::Empty)
            } else {
                Ok(LoadResult::Tracks(tracks))
            }
        }
        "playlist" => {
            let playlist: PlaylistData = serde_json::from_value(response.data)?;
            Ok(LoadResult::Playlist {
                name: playlist.info.name,
                tracks: playlist.tracks,
            })
        }
        "error" => {
            let failure: LoadError = serde_json::from_value(response.data)?;
            Err(Error::ResolveFailed {
                message: failure
                    .message
                    .unwrap_or_else(|| "unknown error".to_string()),
            })
        }
        _ => Ok(LoadResult::Empty),
    }
}

/// Body of `PATCH /v4/sessions/{sessionId}/players/{guildId}`.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlayerPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    track: Option<TrackPatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    paused: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    volume: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filters: Option<Filters>,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice: Option<VoicePayload>,
}

/// `encoded: null` stops the player.
#[derive(Debug, Serialize)]
struct TrackPatch {
    encoded: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoicePayload {
    token: String,
    endpoint: String,
    session_id: String,
}

impl From<&VoiceServer> for VoicePayload {
    fn from(server: &VoiceServer) -> Self {
        Self {
            token: server.token.clone(),
            endpoint: server.endpoint.clone(),
            session_id: server.session_id.clone(),
        }
    }
}

/// Player state kept client-side so it can be replayed on another node.
#[derive(Default)]
struct PlayerState {
    voice: Option<VoicePayload>,
    filters: BTreeMap<FilterLabel, FilterSpec>,
}

/// Connection status of one node, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub label: String,
    pub connected: bool,
}

pub struct LavalinkPool {
    http: reqwest::Client,
    nodes: Vec<Arc<LavalinkNode>>,
    assignments: DashMap<u64, usize>,
    players: DashMap<u64, PlayerState>,
    user_id: u64,
    connection_attempts: u32,
    connection_interval: Duration,
}

impl LavalinkPool {
    #[must_use]
    pub fn new(config: &LavalinkConfig, user_id: u64) -> Self {
        Self {
            http: reqwest::Client::new(),
            nodes: config
                .nodes
                .iter()
                .cloned()
                .map(|node| Arc::new(LavalinkNode::new(node)))
                .collect(),
            assignments: DashMap::new(),
            players: DashMap::new(),
            user_id,
            connection_attempts: config.connection_attempts,
            connection_interval: Duration::from_secs(config.connection_interval_secs),
        }
    }

    /// Opens the websocket of every node in the background.
    pub fn start(&self, events: &EventSender) {
        for node in &self.nodes {
            let node = Arc::clone(node);
            let events = events.clone();
            let (user_id, attempts, interval) = (
                self.user_id,
                self.connection_attempts,
                self.connection_interval,
            );
            tokio::spawn(async move {
                maintain_connection(node, user_id, attempts, interval, events).await;
            });
        }
    }

    pub async fn node_statuses(&self) -> Vec<NodeStatus> {
        let mut statuses = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            statuses.push(NodeStatus {
                label: node.label().to_string(),
                connected: node.session_id().await.is_some(),
            });
        }
        statuses
    }

    async fn any_node(&self) -> Result<Arc<LavalinkNode>> {
        for node in &self.nodes {
            if node.session_id().await.is_some() {
                return Ok(Arc::clone(node));
            }
        }
        Err(Error::NoAvailableNode)
    }

    /// Node serving a guild and its session id. `moved` is set when the guild
    /// had to leave a node that went away.
    async fn node_for(&self, guild_id: u64) -> Result<(Arc<LavalinkNode>, String, bool)> {
        let assigned = self.assignments.get(&guild_id).map(|entry| *entry);
        if let Some(node) = assigned.and_then(|index| self.nodes.get(index)) {
            if let Some(session_id) = node.session_id().await {
                return Ok((Arc::clone(node), session_id, false));
            }
        }

        for (index, node) in self.nodes.iter().enumerate() {
            if let Some(session_id) = node.session_id().await {
                self.assignments.insert(guild_id, index);
                if assigned.is_some() {
                    info!(guild_id, node = %node.label(), "Moved player to another node");
                }
                return Ok((Arc::clone(node), session_id, assigned.is_some()));
            }
        }
        Err(Error::NoAvailableNode)
    }

    async fn update_player(&self, guild_id: u64, mut patch: PlayerPatch) -> Result<()> {
        let (node, session_id, moved) = self.node_for(guild_id).await?;
        if moved && patch.voice.is_none() {
            patch.voice = self
                .players
                .get(&guild_id)
                .and_then(|player| player.voice.clone());
        }

        let url = format!(
            "{}/v4/sessions/{session_id}/players/{guild_id}",
            node.base_url()
        );
        let response = self
            .http
            .patch(url)
            .header(AUTHORIZATION.as_str(), &node.config.password)
            .json(&patch)
            .send()
            .await
            .map_err(rpc_error)?;
        ensure_success(response).await
    }

    async fn apply_filters(&self, guild_id: u64) -> Result<()> {
        let filters = self
            .players
            .get(&guild_id)
            .map(|player| Filters::combine(&player.filters))
            .unwrap_or_default();
        self.update_player(
            guild_id,
            PlayerPatch {
                filters: Some(filters),
                ..PlayerPatch::default()
            },
        )
        .await
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::RelayRpcFailed {
        message: format!("{status}: {body}"),
    })
}

/// Keeps a node connected, giving up after `attempts` consecutive failures.
async fn maintain_connection(
    node: Arc<LavalinkNode>,
    user_id: u64,
    attempts: u32,
    interval: Duration,
    events: EventSender,
) {
    let mut failures = 0;
    loop {
        match node.listen(user_id, &events).await {
            Ok(()) => {
                failures = 0;
                warn!(node = %node.label(), "Lavalink connection closed, reconnecting");
            }
            Err(e) => {
                failures += 1;
                warn!(node = %node.label(), attempt = failures, "Lavalink connection failed: {e}");
            }
        }
        node.set_session_id(None).await;

        if failures >= attempts {
            error!(node = %node.label(), "Giving up on Lavalink node after {failures} attempts");
            return;
        }
        tokio::time::sleep(interval).await;
    }
}

#[async_trait]
impl RelayClient for LavalinkPool {
    #[instrument(skip(self))]
    async fn resolve(&self, query: &str, hint: SearchHint) -> Result<LoadResult> {
        let node = self.any_node().await?;
        let identifier = hint.identifier(query);

        let response = self
            .http
            .get(format!("{}/v4/loadtracks", node.base_url()))
            .header(AUTHORIZATION.as_str(), &node.config.password)
            .query(&[("identifier", identifier.as_str())])
            .send()
            .await
            .map_err(|e| Error::ResolveFailed {
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(Error::ResolveFailed {
                message: format!("node answered {}", response.status()),
            });
        }
        let body: LoadResponse = response.json().await.map_err(|e| Error::ResolveFailed {
            message: e.to_string(),
        })?;
        parse_load_response(body)
    }

    async fn bind_voice(&self, guild_id: u64, server: &VoiceServer) -> Result<()> {
        let voice = VoicePayload::from(server);
        self.players.entry(guild_id).or_default().voice = Some(voice.clone());
        self.update_player(
            guild_id,
            PlayerPatch {
                voice: Some(voice),
                ..PlayerPatch::default()
            },
        )
        .await
    }

    async fn play(&self, guild_id: u64, track: &Track) -> Result<()> {
        self.update_player(
            guild_id,
            PlayerPatch {
                track: Some(TrackPatch {
                    encoded: Some(track.encoded.clone()),
                }),
                paused: Some(false),
                ..PlayerPatch::default()
            },
        )
        .await
    }

    async fn pause(&self, guild_id: u64) -> Result<()> {
        self.update_player(
            guild_id,
            PlayerPatch {
                paused: Some(true),
                ..PlayerPatch::default()
            },
        )
        .await
    }

    async fn resume(&self, guild_id: u64) -> Result<()> {
        self.update_player(
            guild_id,
            PlayerPatch {
                paused: Some(false),
                ..PlayerPatch::default()
            },
        )
        .await
    }

    async fn stop(&self, guild_id: u64) -> Result<()> {
        self.update_player(
            guild_id,
            PlayerPatch {
                track: Some(TrackPatch { encoded: None }),
                ..PlayerPatch::default()
            },
        )
        .await
    }

    async fn set_volume(&self, guild_id: u64, volume: u16) -> Result<()> {
        self.update_player(
            guild_id,
            PlayerPatch {
                volume: Some(volume),
                ..PlayerPatch::default()
            },
        )
        .await
    }

    async fn add_filter(&self, guild_id: u64, label: FilterLabel, spec: &FilterSpec) -> Result<()> {
        self.players
            .entry(guild_id)
            .or_default()
            .filters
            .insert(label, spec.clone());
        self.apply_filters(guild_id).await
    }

    async fn remove_filter(&self, guild_id: u64, label: FilterLabel) -> Result<()> {
        if let Some(mut player) = self.players.get_mut(&guild_id) {
            player.filters.remove(&label);
        }
        self.apply_filters(guild_id).await
    }

    async fn destroy(&self, guild_id: u64) -> Result<()> {
        self.players.remove(&guild_id);
        let Some((_, index)) = self.assignments.remove(&guild_id) else {
            return Ok(());
        };
        let Some(node) = self.nodes.get(index) else {
            return Ok(());
        };
        let Some(session_id) = node.session_id().await else {
            return Ok(());
        };

        let response = self
            .http
            .delete(format!(
                "{}/v4/sessions/{session_id}/players/{guild_id}",
                node.base_url()
            ))
            .header(AUTHORIZATION.as_str(), &node.config.password)
            .send()
            .await
            .map_err(rpc_error)?;
        ensure_success(response).await
    }
}
