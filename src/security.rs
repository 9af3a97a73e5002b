pub mod encryption;

use crate::errors::{AppError, AppResult};
use crate::models::bot::{Bot, NewBot};
use diesel::SqliteConnection;
use encryption::TokenEncryption;
use sha2::{Digest, Sha256};

/// Non-reversible identifier for a raw bot token. Used for the uniqueness
/// check and for display; never sufficient to recover the token.
pub fn token_fingerprint(raw_token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_token.as_bytes());
    hex::encode(hasher.finalize())
}

/// The only component that sees bot-token plaintext. Stores tokens as
/// AES-256-GCM ciphertext and resolves them on demand for the dispatcher.
pub struct TokenVault {
    encryption: Option<TokenEncryption>,
}

impl TokenVault {
    /// `key_hex` is 64 hex chars from `FG_ENCRYPTION_KEY`. An empty key
    /// produces a vault that refuses both store and resolve, so a
    /// misconfigured deployment fails per-feed instead of storing plaintext.
    pub fn new(key_hex: &str) -> AppResult<TokenVault> {
        if key_hex.is_empty() {
            return Ok(TokenVault { encryption: None });
        }
        let encryption = TokenEncryption::new(key_hex)?;
        Ok(TokenVault {
            encryption: Some(encryption),
        })
    }

    fn encryption(&self) -> AppResult<&TokenEncryption> {
        self.encryption
            .as_ref()
            .ok_or_else(|| AppError::Config("FG_ENCRYPTION_KEY is not set".to_string()))
    }

    /// Registers a bot identity: fingerprint for uniqueness, ciphertext for
    /// later recovery. Returns the stored row (ciphertext included, since
    /// the caller is the CLI which never prints it).
    pub fn store(
        &self,
        conn: &mut SqliteConnection,
        raw_token: &str,
        description: Option<&str>,
    ) -> AppResult<Bot> {
        let ciphertext = self.encryption()?.encrypt(raw_token)?;
        let fingerprint = token_fingerprint(raw_token);
        NewBot {
            token_fingerprint: &fingerprint,
            token_ciphertext: Some(&ciphertext),
            description,
        }
        .insert(conn)
    }

    /// Recovers the plaintext token for a bot id. Any failure (missing row,
    /// missing ciphertext, wrong key) collapses to `TokenUnavailable` so
    /// callers treat them uniformly (fatal for the run, no persistence).
    pub fn resolve(&self, conn: &mut SqliteConnection, bot_id: i32) -> AppResult<String> {
        let bot = Bot::get_by_id(conn, bot_id)?.ok_or(AppError::TokenUnavailable(bot_id))?;
        let ciphertext = bot
            .token_ciphertext
            .as_deref()
            .ok_or(AppError::TokenUnavailable(bot_id))?;
        self.encryption()?.decrypt(ciphertext).map_err(|e| {
            log::error!("Failed to decrypt token for bot {bot_id}: {e}");
            AppError::TokenUnavailable(bot_id)
        })
    }
}
