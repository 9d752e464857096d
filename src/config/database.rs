//! Database configuration module.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`,
//! so the schema always matches the Rust structs without hand-written SQL.

use crate::entities::{EconomySettings, EconomyUser, MusicGuild, MusicUser, ShopItem};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use std::path::Path;

/// Default database location when `DATABASE_URL` is not set.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/guildtunes.sqlite?mode=rwc";

/// Establishes a connection to the database at `database_url`, creating the
/// directory of a file-backed `SQLite` database first.
pub async fn create_connection(database_url: &str) -> Result<DatabaseConnection> {
    if let Some(parent) = sqlite_file(database_url).and_then(Path::parent) {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Database::connect(database_url).await.map_err(Into::into)
}

/// Path of the file behind a `sqlite://` URL, `None` for in-memory databases.
fn sqlite_file(database_url: &str) -> Option<&Path> {
    let rest = database_url.strip_prefix("sqlite://")?;
    let path = rest.split('?').next().unwrap_or(rest);
    (!path.is_empty() && !path.contains(":memory:")).then(|| Path::new(path))
}

/// Creates all tables that do not exist yet.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    create_table(db, EconomySettings).await?;
    create_table(db, EconomyUser).await?;
    create_table(db, ShopItem).await?;
    create_table(db, MusicUser).await?;
    create_table(db, MusicGuild).await?;
    Ok(())
}

async fn create_table<E: EntityTrait>(db: &DatabaseConnection, entity: E) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(builder.build(&statement)).await?;
    Ok(())
}
