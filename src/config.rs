use std::env;

/// Runtime configuration, read from `FG_`-prefixed environment variables.
/// A `--config` file is loaded into the environment (dotenv-style) before
/// this is constructed, so file keys and real environment variables are
/// interchangeable; the environment wins when both are set.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    /// 64 hex chars (32 bytes) for AES-256-GCM. Empty means the vault
    /// refuses to store or resolve tokens.
    pub encryption_key: String,
    pub default_frequency_seconds: i32,
    /// Cap on items delivered the first time a feed is seen. `None`
    /// delivers the full feed history.
    pub initial_backfill: Option<usize>,
}

pub const DEFAULT_FREQUENCY_SECONDS: i32 = 300;

impl AppConfig {
    pub fn from_env() -> AppConfig {
        let database_url = match env::var("FG_DATABASE_URL") {
            Ok(path) => {
                log::info!("Using database path from FG_DATABASE_URL: {path}");
                path
            }
            Err(_) => {
                let path = "feedgram.db".to_string();
                log::info!("Using default database path: {path}");
                path
            }
        };

        let encryption_key = env::var("FG_ENCRYPTION_KEY").unwrap_or_default();
        if encryption_key.is_empty() {
            log::warn!("FG_ENCRYPTION_KEY is not set; bot tokens cannot be stored or resolved");
        }

        let default_frequency_seconds = env::var("FG_DEFAULT_FREQUENCY_SECONDS")
            .ok()
            .and_then(|v| v.parse::<i32>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_FREQUENCY_SECONDS);

        let initial_backfill = env::var("FG_INITIAL_BACKFILL")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|v| *v > 0);

        AppConfig {
            database_url,
            encryption_key,
            default_frequency_seconds,
            initial_backfill,
        }
    }
}
