//! Typed event dispatch for relay and voice-state events.
//!
//! Producers (the Lavalink websocket readers, the Discord gateway handler) push
//! [`MusicEvent`]s into an unbounded channel. A single dispatcher task drains it
//! and hands each event to the registered handlers in order, so events for one
//! guild are never processed concurrently.

use super::track::{Track, TrackEndReason};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MusicEvent {
    TrackEnd {
        guild_id: u64,
        track: Track,
        reason: TrackEndReason,
    },
    /// Someone joined, left or moved between voice channels of a guild.
    VoiceStateChanged {
        guild_id: u64,
        channel_id: Option<u64>,
    },
}

pub type EventSender = mpsc::UnboundedSender<MusicEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<MusicEvent>;

#[must_use]
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Receives music events. Every method defaults to ignoring the event.
#[async_trait]
pub trait MusicEventHandler: Send + Sync {
    async fn on_track_end(&self, _guild_id: u64, _track: &Track, _reason: TrackEndReason) {}

    async fn on_voice_state_changed(&self, _guild_id: u64, _channel_id: Option<u64>) {}
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn MusicEventHandler>>,
}

impl EventDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn MusicEventHandler>) {
        self.handlers.push(handler);
    }

    pub async fn dispatch(&self, event: &MusicEvent) {
        for handler in &self.handlers {
            match event {
                MusicEvent::TrackEnd {
                    guild_id,
                    track,
                    reason,
                } => handler.on_track_end(*guild_id, track, *reason).await,
                MusicEvent::VoiceStateChanged {
                    guild_id,
                    channel_id,
                } => handler.on_voice_state_changed(*guild_id, *channel_id).await,
            }
        }
    }

    /// Processes events until every sender is dropped.
    pub fn spawn(self, mut events: EventReceiver) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                self.dispatch(&event).await;
            }
            debug!("Music event channel closed");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MusicEventHandler for Recorder {
        async fn on_voice_state_changed(&self, guild_id: u64, channel_id: Option<u64>) {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(format!("{guild_id}:{channel_id:?}"));
            }
        }
    }

    #[tokio::test]
    async fn test_events_reach_handlers_in_order() {
        let recorder = Arc::new(Recorder::default());
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(Arc::clone(&recorder) as Arc<dyn MusicEventHandler>);

        let (tx, rx) = channel();
        let task = dispatcher.spawn(rx);
        for channel_id in [Some(1), None] {
            let sent = tx.send(MusicEvent::VoiceStateChanged {
                guild_id: 9,
                channel_id,
            });
            assert!(sent.is_ok());
        }
        drop(tx);
        assert!(task.await.is_ok());

        let seen = recorder.seen.lock().map(|s| s.clone()).unwrap_or_default();
        assert_eq!(seen, vec!["9:Some(1)", "9:None"]);
    }
}
