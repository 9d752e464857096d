//! Music notifications and the publisher that posts them.

use super::{
    filters::FilterLabel,
    track::{Track, format_length},
};
use crate::platform::ChannelMessenger;
use std::{fmt::Write as _, sync::Arc};
use tracing::warn;

/// Entries shown by a queue view.
pub const QUEUE_VIEW_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Nobody listened for the whole idle timeout
    Idle,
    /// The bot was removed from its voice channel
    ChannelLeft,
    /// A member asked the bot to leave
    Requested,
}

/// Something worth telling a guild about its music session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    NowPlaying {
        track: Track,
        position: usize,
    },
    Enqueued {
        title: String,
        count: usize,
        total_length: u64,
        position: usize,
    },
    QueueView {
        current: Option<Track>,
        upcoming: Vec<Track>,
        total: usize,
    },
    Disconnected(DisconnectReason),
    Paused,
    Resumed,
    Skipped {
        next: Option<Track>,
    },
    Stopped,
    LoopChanged(bool),
    VolumeChanged(u16),
    FilterAdded(FilterLabel),
    FilterRemoved(FilterLabel),
}

impl Notification {
    /// Message text for the chat channel.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::NowPlaying { track, position } => format!(
                "🎶 Now playing **{}** by {} `[{}]` (#{position})",
                track.display(),
                track.info.author,
                format_length(track.info.length)
            ),
            Self::Enqueued {
                title,
                count: 1,
                total_length,
                position,
            } => format!(
                "➕ Added **{title}** `[{}]` to the queue at position {position}",
                format_length(*total_length)
            ),
            Self::Enqueued {
                title,
                count,
                total_length,
                position,
            } => format!(
                "➕ Added {count} tracks from **{title}** `[{}]` starting at position {position}",
                format_length(*total_length)
            ),
            Self::QueueView {
                current,
                upcoming,
                total,
            } => render_queue(current.as_ref(), upcoming, *total),
            Self::Disconnected(DisconnectReason::Idle) => {
                "👋 Left the voice channel after being idle".to_string()
            }
            Self::Disconnected(DisconnectReason::ChannelLeft) => {
                "👋 Disconnected from the voice channel".to_string()
            }
            Self::Disconnected(DisconnectReason::Requested) => "👋 Bye!".to_string(),
            Self::Paused => "⏸️ Paused".to_string(),
            Self::Resumed => "▶️ Resumed".to_string(),
            Self::Skipped { next: Some(track) } => {
                format!("⏭️ Skipped, now playing **{}**", track.title())
            }
            Self::Skipped { next: None } => "⏭️ Skipped, the queue is now empty".to_string(),
            Self::Stopped => "⏹️ Stopped playback and cleared the queue".to_string(),
            Self::LoopChanged(true) => "🔂 Looping the current track".to_string(),
            Self::LoopChanged(false) => "➡️ Looping disabled".to_string(),
            Self::VolumeChanged(volume) => format!("🔊 Volume set to {volume}%"),
            Self::FilterAdded(label) => format!("🎛️ Enabled the `{label}` filter"),
            Self::FilterRemoved(label) => format!("🎛️ Disabled the `{label}` filter"),
        }
    }
}

fn render_queue(current: Option<&Track>, upcoming: &[Track], total: usize) -> String {
    let mut out = String::new();
    match current {
        Some(track) => {
            let _ = writeln!(out, "**Now playing:** {}", track.display());
        }
        None => out.push_str("**Nothing is playing**\n"),
    }
    if upcoming.is_empty() {
        out.push_str("The queue is empty");
        return out;
    }
    for (i, track) in upcoming.iter().enumerate() {
        let _ = writeln!(
            out,
            "`{}.` {} `[{}]`",
            i + 1,
            track.title(),
            format_length(track.info.length)
        );
    }
    if total > upcoming.len() {
        let _ = write!(out, "...and {} more", total - upcoming.len());
    }
    out.trim_end().to_string()
}

/// Posts notifications to the channel a guild last used for a music command.
#[derive(Clone)]
pub struct NotificationPublisher {
    messenger: Arc<dyn ChannelMessenger>,
}

impl NotificationPublisher {
    #[must_use]
    pub fn new(messenger: Arc<dyn ChannelMessenger>) -> Self {
        Self { messenger }
    }

    /// Posts unconditionally. Dropped when no channel is known.
    pub async fn announce(&self, channel_id: Option<u64>, notification: &Notification) {
        let Some(channel_id) = channel_id else {
            return;
        };
        if let Err(e) = self
            .messenger
            .send_message(channel_id, &notification.render())
            .await
        {
            warn!(channel_id, "Failed to post music notification: {e}");
        }
    }

    /// Posts only when the guild has alerts enabled.
    pub async fn alert(
        &self,
        channel_id: Option<u64>,
        alerts_enabled: bool,
        notification: &Notification,
    ) {
        if alerts_enabled {
            self.announce(channel_id, notification).await;
        }
    }
}
