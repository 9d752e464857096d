//! Bot layer - Discord-specific interface and command handlers
//!
//! This module wires the poise framework to the core: it builds the shared
//! [`BotData`], routes gateway voice events into the music dispatcher and maps
//! command errors to user replies.

/// Discord command implementations (music, favorites, economy, shop, income)
pub mod commands;
/// Serenity and songbird implementations of the platform traits
pub mod discord;
/// Discord interaction handlers (autocomplete, etc.)
pub mod handlers;

use crate::{
    config::settings::AppConfig,
    core::gambling::CooldownTracker,
    errors::{Error, Result},
    music::{
        events::{self, EventDispatcher, EventSender, MusicEvent, MusicEventHandler},
        lavalink::LavalinkPool,
        notify::NotificationPublisher,
        registry::{Invoker, SessionRegistry},
        relay::RelayClient,
        session::MusicContext,
        spotify::SpotifyClient,
        voice::VoiceGateway,
    },
    platform::{ChannelMessenger, MemberDirectory},
    scheduler::IncomeScheduler,
};
use discord::{DiscordMembers, DiscordMessenger, DiscordVoice};
use poise::serenity_prelude as serenity;
use sea_orm::DatabaseConnection;
use songbird::{Songbird, serenity::SerenityInit};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Poise context used by every command.
pub type Context<'a> = poise::Context<'a, BotData, Error>;

/// Shared data available to all bot commands.
pub struct BotData {
    /// Database connection for all database operations
    pub database: DatabaseConnection,
    pub registry: Arc<SessionRegistry>,
    pub scheduler: Arc<IncomeScheduler>,
    pub cooldowns: CooldownTracker,
    pub members: Arc<dyn MemberDirectory>,
    pub voice: Arc<dyn VoiceGateway>,
    pub spotify: SpotifyClient,
    pub lavalink: Arc<LavalinkPool>,
    /// Feeds gateway voice events to the music dispatcher
    pub events: EventSender,
}

impl BotData {
    /// Builds every collaborator and starts the background tasks: node
    /// websockets, the music event dispatcher and the income scheduler.
    pub async fn start(
        ctx: &serenity::Context,
        bot_user_id: u64,
        songbird: Arc<Songbird>,
        config: AppConfig,
        database: DatabaseConnection,
    ) -> Result<Self> {
        let (events, receiver) = events::channel();

        let lavalink = Arc::new(LavalinkPool::new(&config.lavalink, bot_user_id));
        lavalink.start(&events);

        let voice: Arc<dyn VoiceGateway> =
            Arc::new(DiscordVoice::new(songbird, Arc::clone(&ctx.cache)));
        let messenger: Arc<dyn ChannelMessenger> =
            Arc::new(DiscordMessenger::new(Arc::clone(&ctx.http)));
        let members: Arc<dyn MemberDirectory> =
            Arc::new(DiscordMembers::new(Arc::clone(&ctx.http)));

        let registry = SessionRegistry::new(
            MusicContext {
                relay: Arc::clone(&lavalink) as Arc<dyn RelayClient>,
                voice: Arc::clone(&voice),
                publisher: NotificationPublisher::new(Arc::clone(&messenger)),
            },
            database.clone(),
        );
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(Arc::clone(&registry) as Arc<dyn MusicEventHandler>);
        dispatcher.spawn(receiver);

        let scheduler = IncomeScheduler::new(database.clone(), Arc::clone(&members), messenger);
        scheduler.start().await?;

        Ok(Self {
            database,
            registry,
            scheduler,
            cooldowns: CooldownTracker::new(),
            members,
            voice,
            spotify: SpotifyClient::new(config.spotify),
            lavalink,
            events,
        })
    }
}

/// Invoker of a music command. Fails outside of guilds.
pub fn invoker(ctx: Context<'_>) -> Result<Invoker> {
    let guild_id = ctx.guild_id().ok_or(Error::GuildOnly)?;
    Ok(Invoker {
        guild_id: guild_id.get(),
        user_id: ctx.author().id.get(),
        channel_id: ctx.channel_id().get(),
    })
}

/// Guild id of a command. Fails outside of guilds.
pub fn guild_id(ctx: Context<'_>) -> Result<u64> {
    ctx.guild_id().map(serenity::GuildId::get).ok_or(Error::GuildOnly)
}

async fn on_error(error: poise::FrameworkError<'_, BotData, Error>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => {
            error!("Failed to start bot: {error}");
        }
        poise::FrameworkError::Command { error, ctx, .. } => {
            let reply = if error.is_user_facing() {
                if error.is_internal() {
                    error!(command = %ctx.command().name, "Internal error: {error:?}");
                }
                format!("❌ {error}")
            } else {
                error!(command = %ctx.command().name, "Command failed: {error:?}");
                "❌ Something went wrong, please try again later.".to_string()
            };
            if let Err(e) = ctx.say(reply).await {
                error!("Failed to send error message: {e}");
            }
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                error!("Error while handling error: {e}");
            }
        }
    }
}

/// Forwards voice-state updates of guilds with a music session.
async fn event_handler(
    _ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, BotData, Error>,
    data: &BotData,
) -> Result<()> {
    if let serenity::FullEvent::VoiceStateUpdate { new, .. } = event {
        let Some(guild_id) = new.guild_id.map(serenity::GuildId::get) else {
            return Ok(());
        };
        if !data.registry.is_active(guild_id).await {
            return Ok(());
        }
        let event = MusicEvent::VoiceStateChanged {
            guild_id,
            channel_id: data.voice.current_channel(guild_id),
        };
        if data.events.send(event).is_err() {
            warn!(guild_id, "Music event channel closed");
        }
    }
    Ok(())
}

/// Runs the bot until the gateway connection ends or Ctrl+C is received.
#[instrument(skip_all)]
pub async fn run_bot(token: String, config: AppConfig, database: DatabaseConnection) -> Result<()> {
    let songbird = Songbird::serenity();
    let voice_manager = Arc::clone(&songbird);

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            on_error: |error| Box::pin(on_error(error)),
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Logged in as {}", ready.user.name);
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                info!("Registered {} commands", framework.options().commands.len());

                let data =
                    BotData::start(ctx, ready.user.id.get(), voice_manager, config, database)
                        .await?;

                let registry = Arc::clone(&data.registry);
                let scheduler = Arc::clone(&data.scheduler);
                let shard_manager = Arc::clone(framework.shard_manager());
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        info!("Shutting down");
                        scheduler.shutdown().await;
                        registry.destroy_all().await;
                        shard_manager.shutdown_all().await;
                    }
                });

                Ok(data)
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::GUILD_VOICE_STATES;

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .register_songbird_with(songbird)
        .await?;

    info!("Starting bot client...");
    client.start().await?;
    Ok(())
}
