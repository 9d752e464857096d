//! Discord command implementations organized by category.

#![allow(clippy::too_long_first_doc_paragraph)]

/// Economy commands: balances, transfers, gambling and server setup
pub mod economy;

/// Favorite song commands
pub mod favorites;

/// General utility commands
pub mod general;

/// Role income administration
pub mod income;

/// Music playback commands
pub mod music;

/// Shop and inventory commands
pub mod shop;

/// Spotify account commands
pub mod spotify;

use crate::{
    bot::BotData,
    errors::Error,
    music::{notify::Notification, session::EnqueueOutcome},
};

/// Every command the bot registers.
#[must_use]
pub fn all() -> Vec<poise::Command<BotData, Error>> {
    vec![
        general::ping(),
        general::help(),
        general::status(),
        music::play(),
        music::join(),
        music::pause(),
        music::resume(),
        music::skip(),
        music::stop(),
        music::loop_track(),
        music::volume(),
        music::filter(),
        music::queue(),
        music::nowplaying(),
        music::leave(),
        music::alerts(),
        favorites::favorites(),
        spotify::spotify(),
        economy::economy(),
        economy::balance(),
        economy::deposit(),
        economy::withdraw(),
        economy::pay(),
        economy::work(),
        economy::coinflip(),
        economy::leaderboard(),
        shop::shop(),
        shop::inventory(),
        income::income(),
    ]
}

/// Reply text for a successful enqueue.
#[must_use]
pub fn enqueue_reply(outcome: &EnqueueOutcome) -> String {
    match outcome {
        EnqueueOutcome::Started { track, queued: 0 } => {
            format!("▶️ Starting **{}**", track.title())
        }
        EnqueueOutcome::Started { track, queued } => {
            format!("▶️ Starting **{}** and queued {queued} more", track.title())
        }
        EnqueueOutcome::Queued {
            first,
            count,
            position,
            total_length,
        } => Notification::Enqueued {
            title: first.title().to_string(),
            count: *count,
            total_length: *total_length,
            position: *position,
        }
        .render(),
    }
}
