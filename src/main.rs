use dotenvy::dotenv;
use guildtunes::{
    bot,
    config::{database, settings},
    errors::{Error, Result},
};
use std::env;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file, env vars can also be set externally
    dotenv().ok();

    // 3. Load the application configuration (config.toml + environment)
    let app_config = settings::load_app_configuration()
        .inspect_err(|e| error!("Critical error loading application configuration: {e}"))?;

    // 4. Connect to the database and create missing tables
    let database_url = app_config.database_url();
    let db = database::create_connection(&database_url)
        .await
        .inspect_err(|e| error!("Failed to connect to the database: {e}"))?;
    database::create_tables(&db)
        .await
        .inspect(|()| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to create tables: {e}"))?;

    // 5. Run the bot. The token is read right before use and never stored.
    let token = env::var("DISCORD_BOT_TOKEN")
        .inspect_err(|e| error!("DISCORD_BOT_TOKEN not found: {e}"))
        .map_err(Error::EnvVar)?;

    bot::run_bot(token, app_config, db).await
}
