//! Guild music sessions on top of a Lavalink-compatible audio relay.
//!
//! The [`registry::SessionRegistry`] owns one [`session::MusicSession`] per
//! guild. Relay and voice access go through the [`relay::RelayClient`] and
//! [`voice::VoiceGateway`] traits so the session logic runs against fakes in
//! tests.

pub mod events;
pub mod filters;
pub mod lavalink;
pub mod notify;
pub mod registry;
pub mod relay;
pub mod session;
pub mod spotify;
pub mod track;
pub mod voice;
