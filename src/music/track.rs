//! Track descriptors as returned by the audio relay.

use crate::core::favorites::FavoriteSong;
use serde::{Deserialize, Serialize};

/// A playable track. `encoded` is the relay's opaque handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub encoded: String,
    pub info: TrackInfo,
}

/// Display metadata of a track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    pub identifier: String,
    pub title: String,
    pub author: String,
    /// Length in milliseconds
    pub length: u64,
    #[serde(default)]
    pub is_stream: bool,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub artwork_url: Option<String>,
    #[serde(default)]
    pub source_name: String,
}

impl Track {
    #[must_use]
    pub fn title(&self) -> &str {
        &self.info.title
    }

    /// Markdown link to the track source, or the bare title.
    #[must_use]
    pub fn display(&self) -> String {
        match &self.info.uri {
            Some(uri) => format!("[{}]({uri})", self.info.title),
            None => self.info.title.clone(),
        }
    }

    /// The favorite entry describing this track.
    #[must_use]
    pub fn to_favorite(&self) -> FavoriteSong {
        FavoriteSong {
            title: self.info.title.clone(),
            url: self
                .info
                .uri
                .clone()
                .unwrap_or_else(|| self.info.identifier.clone()),
            author: self.info.author.clone(),
            artwork_url: self.info.artwork_url.clone(),
            length: self.info.length,
        }
    }
}

/// Why the relay stopped playing a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackEndReason {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
    /// The node dropped an abandoned player
    Cleanup,
}

impl TrackEndReason {
    /// Only natural ends and explicit stops move the queue.
    #[must_use]
    pub const fn advances_queue(self) -> bool {
        matches!(self, Self::Finished | Self::Stopped)
    }
}

/// How a free-form query is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchHint {
    Youtube,
    SpotifySearch,
    UrlPassthrough,
}

impl SearchHint {
    /// Relay identifier for `query`. Links always pass through untouched.
    #[must_use]
    pub fn identifier(self, query: &str) -> String {
        let query = query.trim();
        if query.starts_with("http://") || query.starts_with("https://") {
            return query.to_string();
        }
        match self {
            Self::Youtube => format!("ytsearch:{query}"),
            Self::SpotifySearch => format!("spsearch:{query}"),
            Self::UrlPassthrough => query.to_string(),
        }
    }
}

/// Outcome of resolving a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadResult {
    /// A single track or search results, best match first
    Tracks(Vec<Track>),
    Playlist { name: String, tracks: Vec<Track> },
    Empty,
}

impl LoadResult {
    /// Tracks to enqueue: every playlist entry, or the best single match.
    #[must_use]
    pub fn into_tracks(self) -> Vec<Track> {
        match self {
            Self::Tracks(mut tracks) => {
                tracks.truncate(1);
                tracks
            }
            Self::Playlist { tracks, .. } => tracks,
            Self::Empty => Vec::new(),
        }
    }
}

/// Formats milliseconds as `m:ss` or `h:mm:ss`.
#[must_use]
pub fn format_length(ms: u64) -> String {
    let total = ms / 1000;
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}
