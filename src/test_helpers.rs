use crate::db::MIGRATIONS;
use crate::models::feed::{Feed, NewFeed};
use diesel::prelude::*;
use diesel::{Connection, SqliteConnection};
use diesel_migrations::MigrationHarness;

pub const TEST_ENCRYPTION_KEY: &str =
    "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

pub fn get_test_db_connection() -> SqliteConnection {
    let mut conn = SqliteConnection::establish(":memory:")
        .unwrap_or_else(|_| panic!("Error connecting to in-memory SQLite database"));

    conn.run_pending_migrations(MIGRATIONS)
        .expect("Failed to run migrations");
    diesel::sql_query("PRAGMA foreign_keys = ON")
        .execute(&mut conn)
        .expect("Failed to enable foreign keys");
    conn
}

pub fn insert_test_feed(conn: &mut SqliteConnection, url: &str) -> Feed {
    NewFeed {
        url,
        user_title: None,
        frequency_seconds: 300,
        bot_id: None,
        chat_id: "42",
        proxy_id: None,
        formatting_profile_id: None,
        enabled: true,
    }
    .insert(conn)
    .expect("Failed to insert test feed")
}
