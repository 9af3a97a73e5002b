use crate::errors::{AppError, AppResult};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::path::Path;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("src/migrations");

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

/// Applied to every pooled connection. Foreign keys are off by default in
/// SQLite and processed_items relies on ON DELETE CASCADE; WAL and the busy
/// timeout keep the CLI and a running service from tripping over each other.
#[derive(Debug)]
struct ConnectionOptions;

impl diesel::r2d2::CustomizeConnection<SqliteConnection, diesel::r2d2::Error>
    for ConnectionOptions
{
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(
            "PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;",
        )
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

pub fn initialize_db_pool(database_url: &str) -> AppResult<DbPool> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let pool = Pool::builder()
        .connection_customizer(Box::new(ConnectionOptions))
        .build(manager)
        .map_err(|e| AppError::Config(format!("failed to open database {database_url}: {e}")))?;

    let mut conn = pool.get()?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| AppError::Config(format!("failed to run migrations: {e}")))?;

    Ok(pool)
}

/// Online backup via `VACUUM INTO`, which produces a consistent snapshot
/// without blocking writers.
pub fn backup(conn: &mut SqliteConnection, output_path: &str) -> AppResult<()> {
    let escaped = output_path.replace('\'', "''");
    diesel::sql_query(format!("VACUUM INTO '{escaped}'")).execute(conn)?;
    log::info!("Database backed up to {output_path}");
    Ok(())
}

/// Overwrites the current database file with the backup. The caller must
/// have confirmed the overwrite and closed any open pool first.
pub fn restore(database_url: &str, backup_path: &str) -> AppResult<()> {
    if !Path::new(backup_path).is_file() {
        return Err(AppError::not_found("backup file"));
    }
    std::fs::copy(backup_path, database_url)?;
    log::info!("Database restored from {backup_path}");
    Ok(())
}

pub fn now_epoch() -> i32 {
    chrono::Utc::now().timestamp() as i32
}
