//! Unified error type for the bot.
//!
//! Variants fall into three groups. Precondition errors describe something the
//! invoking user can fix and are shown verbatim. External errors come from the
//! audio relay, Spotify, or Discord and are shown verbatim on command paths but
//! only logged on background paths. Internal errors point at a bug and are
//! logged with full context.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // ---- Precondition ----
    #[error("You must be connected to a voice channel to use this command")]
    UserNotInVoice,

    #[error("You must be in the same voice channel as the bot")]
    MustShareChannel,

    #[error("This command can only be used inside a server")]
    GuildOnly,

    #[error("The economy is disabled on this server")]
    EconomyDisabled,

    #[error("Insufficient funds: you have {current}, but {required} is required")]
    InsufficientFunds { current: i64, required: i64 },

    #[error("The queue is full ({current}/{cap} tracks)")]
    QueueFull { cap: usize, current: usize },

    #[error("Item '{name}' was not found")]
    ItemNotFound { name: String },

    #[error("Item '{name}' already exists")]
    ItemExists { name: String },

    #[error("Limit reached: at most {cap} {kind} allowed")]
    LimitReached { kind: &'static str, cap: usize },

    #[error("Invalid amount: {amount}")]
    InvalidAmount { amount: i64 },

    #[error("{message}")]
    InvalidInput { message: String },

    #[error("This command is on cooldown, try again in {remaining_secs}s")]
    CooldownActive { remaining_secs: i64 },

    #[error("You need the <@&{role_id}> role to buy this item")]
    MissingRole { role_id: u64 },

    #[error("No income rule is configured for <@&{role_id}>")]
    IncomeRuleNotFound { role_id: u64 },

    #[error("Favorite '{title}' was not found")]
    FavoriteNotFound { title: String },

    #[error("'{title}' is already in your favorites")]
    FavoriteExists { title: String },

    #[error("Nothing is playing right now")]
    NothingPlaying,

    #[error("Playback is already paused")]
    AlreadyPaused,

    #[error("Playback is not paused")]
    NotPaused,

    #[error("Disable looping before skipping the current track")]
    LoopEnabled,

    #[error("A skip is already in progress")]
    SkipInProgress,

    #[error("No results found for '{query}'")]
    NoResults { query: String },

    #[error("Link your Spotify account first")]
    SpotifyNotLinked,

    // ---- External ----
    #[error("No audio node is available right now")]
    NoAvailableNode,

    #[error("Could not load tracks: {message}")]
    ResolveFailed { message: String },

    #[error("Audio node request failed: {message}")]
    RelayRpcFailed { message: String },

    #[error("The bot is already connected to another voice channel")]
    AlreadyConnectedElsewhere,

    #[error("Failed to join the voice channel: {message}")]
    VoiceConnectFailed { message: String },

    #[error("Spotify rejected our credentials")]
    SpotifyUnauthorized,

    #[error("Spotify is rate limiting requests{}", .retry_after.map(|s| format!(", retry in {s}s")).unwrap_or_default())]
    SpotifyRateLimited { retry_after: Option<u64> },

    #[error("Spotify could not find that resource")]
    SpotifyNotFound,

    #[error("Spotify support is not configured on this bot")]
    SpotifyMisconfigured,

    // ---- Internal ----
    #[error("The music session has ended")]
    SessionTerminated,

    #[error("Unknown filter '{label}'")]
    FilterUnknown { label: String },

    #[error("Filter '{label}' is not active")]
    FilterNotActive { label: String },

    // ---- Ambient ----
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Formatting error: {0}")]
    Fmt(#[from] std::fmt::Error),

    #[error("Serenity/Poise framework error: {0}")]
    Framework(Box<poise::serenity_prelude::Error>),
}

impl From<poise::serenity_prelude::Error> for Error {
    fn from(value: poise::serenity_prelude::Error) -> Self {
        Self::Framework(Box::new(value))
    }
}

impl Error {
    /// Whether the message can be shown to the end user as-is.
    ///
    /// Infrastructure failures (database, HTTP plumbing, configuration) are
    /// logged and replaced with a generic reply.
    #[must_use]
    pub const fn is_user_facing(&self) -> bool {
        !matches!(
            self,
            Self::Config { .. }
                | Self::Database(_)
                | Self::Http(_)
                | Self::Serialization(_)
                | Self::Io(_)
                | Self::EnvVar(_)
                | Self::Fmt(_)
                | Self::Framework(_)
        )
    }

    /// Whether the error points at a programming mistake rather than user input
    /// or an upstream failure.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::SessionTerminated | Self::FilterUnknown { .. } | Self::FilterNotActive { .. }
        )
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
