//! Core business logic, independent of Discord.
//!
//! Functions take a database connection and plain ids so they can be exercised
//! from commands, background tasks and tests alike.

pub mod economy;
pub mod favorites;
pub mod gambling;
pub mod income;
pub mod music_settings;
pub mod shop;
