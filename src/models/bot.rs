use crate::errors::AppResult;
use crate::schema::*;
use diesel::prelude::*;
use serde::Serialize;

/// A Telegram bot identity. Only a SHA-256 fingerprint and an AES-GCM
/// ciphertext of the token are persisted; plaintext lives in the vault for
/// the duration of a send and is never logged.
#[derive(Debug, Serialize, Queryable, Identifiable, PartialEq, Clone)]
#[diesel(table_name = bots)]
pub struct Bot {
    pub id: i32,
    pub token_fingerprint: String,
    #[serde(skip_serializing)]
    pub token_ciphertext: Option<String>,
    pub description: Option<String>,
    pub created_at: i32,
    pub updated_at: i32,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = bots)]
pub struct NewBot<'a> {
    pub token_fingerprint: &'a str,
    pub token_ciphertext: Option<&'a str>,
    pub description: Option<&'a str>,
}

impl<'a> NewBot<'a> {
    pub fn insert(&self, conn: &mut SqliteConnection) -> AppResult<Bot> {
        use crate::schema::bots::dsl::*;
        let bot = diesel::insert_into(bots).values(self).get_result(conn)?;
        Ok(bot)
    }
}

impl Bot {
    pub fn get_by_id(conn: &mut SqliteConnection, bot_id: i32) -> AppResult<Option<Bot>> {
        use crate::schema::bots::dsl::*;
        let bot = bots.find(bot_id).first::<Bot>(conn).optional()?;
        Ok(bot)
    }

    pub fn get_all(conn: &mut SqliteConnection) -> AppResult<Vec<Bot>> {
        use crate::schema::bots::dsl::*;
        let found = bots.order(id.asc()).load::<Bot>(conn)?;
        Ok(found)
    }
}
