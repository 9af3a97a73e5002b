use crate::app;
use crate::config::AppConfig;
use crate::db::{self, DbPool};
use crate::errors::{AppError, AppResult};
use crate::models::bot::Bot;
use crate::models::feed::{Feed, NewFeed};
use crate::models::formatting_profile::{FormatProfileConfig, FormattingProfile, NewFormattingProfile};
use crate::models::proxy::{NewProxy, Proxy, ProxyKind};
use crate::security::TokenVault;
use crate::transport;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "feedgram", version, about = "Poll RSS/Atom feeds and forward new items to Telegram chats")]
pub struct Cli {
    /// Dotenv-style config file loaded before FG_* environment variables
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Format items but send nothing and persist nothing
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage RSS feeds
    #[command(subcommand)]
    Feed(FeedCommand),
    /// Manage Telegram bot identities
    #[command(subcommand)]
    Bot(BotCommand),
    /// Manage egress proxies
    #[command(subcommand)]
    Proxy(ProxyCommand),
    /// Manage formatting profiles
    #[command(subcommand, name = "formatprofile")]
    FormatProfile(FormatProfileCommand),
    /// Database maintenance
    #[command(subcommand)]
    Db(DbCommand),
    /// Start the polling and delivery service
    Run,
}

#[derive(Subcommand, Debug)]
pub enum FeedCommand {
    /// Add a new RSS feed
    Add {
        url: String,
        /// Telegram chat id (numeric) or @channel handle
        #[arg(long)]
        chat_id: String,
        /// Custom title for the feed
        #[arg(long)]
        title: Option<String>,
        /// Fetch frequency in seconds
        #[arg(long, default_value_t = 300)]
        freq: i32,
        /// Bot identity to send through
        #[arg(long)]
        bot_token_id: Option<i32>,
        /// Proxy configuration to fetch through
        #[arg(long)]
        proxy_id: Option<i32>,
        /// Formatting profile to render with
        #[arg(long)]
        format_profile_id: Option<i32>,
        /// Enable the feed immediately
        #[arg(long, action = clap::ArgAction::Set, num_args = 0..=1, default_value_t = true, default_missing_value = "true")]
        enabled: bool,
    },
    /// List all configured feeds
    List,
}

#[derive(Subcommand, Debug)]
pub enum BotCommand {
    /// Register a bot token (stored encrypted, never echoed back)
    Add {
        raw_token: String,
        #[arg(long, short)]
        description: Option<String>,
    },
    /// List bot identities (metadata only)
    List,
}

#[derive(Subcommand, Debug)]
pub enum ProxyCommand {
    /// Add a proxy, e.g. `proxy add corp http 10.0.0.1:8080`
    Add {
        name: String,
        kind: ProxyKind,
        /// host:port
        address: String,
        #[arg(long, short)]
        username: Option<String>,
        #[arg(long, short)]
        password: Option<String>,
        /// Use for feed fetching when a feed has no proxy of its own
        #[arg(long)]
        default_rss: bool,
        /// Use for Telegram delivery when a feed has no proxy of its own
        #[arg(long)]
        default_telegram: bool,
    },
    /// List configured proxies
    List,
    /// Check that a proxy can reach a target URL
    Validate {
        proxy_id: i32,
        #[arg(long, default_value = "https://www.google.com/generate_204")]
        target_url: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum FormatProfileCommand {
    /// Add a formatting profile from a JSON file and/or flags
    Add {
        name: String,
        /// JSON file with the profile config; flags override its values
        #[arg(long, short)]
        config_file: Option<PathBuf>,
        #[arg(long)]
        title_template: Option<String>,
        #[arg(long)]
        message_template: Option<String>,
        /// Comma-separated list, e.g. `--hashtags news,rust`
        #[arg(long, value_delimiter = ',')]
        hashtags: Option<Vec<String>>,
        #[arg(long)]
        include_author: bool,
        #[arg(long)]
        omit_generic_title_regex: Option<String>,
    },
    /// List formatting profiles
    List,
}

#[derive(Subcommand, Debug)]
pub enum DbCommand {
    /// Snapshot the database to a backup file
    Backup {
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Overwrite the database from a backup file (asks for confirmation)
    Restore { backup_path: PathBuf },
}

pub fn execute(cli: Cli, config: &AppConfig) -> AppResult<()> {
    match cli.command {
        Command::Run => app::run_service(config, cli.dry_run),
        Command::Feed(cmd) => match cmd {
            FeedCommand::Add {
                url,
                chat_id,
                title,
                freq,
                bot_token_id,
                proxy_id,
                format_profile_id,
                enabled,
            } => feed_add(
                config,
                &url,
                &chat_id,
                title.as_deref(),
                freq,
                bot_token_id,
                proxy_id,
                format_profile_id,
                enabled,
            ),
            FeedCommand::List => feed_list(config),
        },
        Command::Bot(cmd) => match cmd {
            BotCommand::Add {
                raw_token,
                description,
            } => bot_add(config, &raw_token, description.as_deref()),
            BotCommand::List => bot_list(config),
        },
        Command::Proxy(cmd) => match cmd {
            ProxyCommand::Add {
                name,
                kind,
                address,
                username,
                password,
                default_rss,
                default_telegram,
            } => proxy_add(
                config,
                &name,
                kind,
                &address,
                username.as_deref(),
                password.as_deref(),
                default_rss,
                default_telegram,
            ),
            ProxyCommand::List => proxy_list(config),
            ProxyCommand::Validate {
                proxy_id,
                target_url,
            } => proxy_validate(config, proxy_id, &target_url),
        },
        Command::FormatProfile(cmd) => match cmd {
            FormatProfileCommand::Add {
                name,
                config_file,
                title_template,
                message_template,
                hashtags,
                include_author,
                omit_generic_title_regex,
            } => format_profile_add(
                config,
                &name,
                config_file.as_deref(),
                title_template,
                message_template,
                hashtags,
                include_author,
                omit_generic_title_regex,
            ),
            FormatProfileCommand::List => format_profile_list(config),
        },
        Command::Db(cmd) => match cmd {
            DbCommand::Backup { output } => db_backup(config, output),
            DbCommand::Restore { backup_path } => db_restore(config, &backup_path),
        },
    }
}

fn open_pool(config: &AppConfig) -> AppResult<DbPool> {
    db::initialize_db_pool(&config.database_url)
}

#[allow(clippy::too_many_arguments)]
fn feed_add(
    config: &AppConfig,
    url: &str,
    chat_id: &str,
    title: Option<&str>,
    freq: i32,
    bot_token_id: Option<i32>,
    proxy_id: Option<i32>,
    format_profile_id: Option<i32>,
    enabled: bool,
) -> AppResult<()> {
    if freq < 1 {
        return Err(AppError::invalid_input(
            "freq",
            "fetch frequency must be at least 1 second",
        ));
    }
    let pool = open_pool(config)?;
    let mut conn = pool.get()?;
    let feed = NewFeed {
        url,
        user_title: title,
        frequency_seconds: freq,
        bot_id: bot_token_id,
        chat_id,
        proxy_id,
        formatting_profile_id: format_profile_id,
        enabled,
    }
    .insert(&mut conn)?;
    println!("Feed added with ID: {}", feed.id);
    Ok(())
}

fn feed_list(config: &AppConfig) -> AppResult<()> {
    let pool = open_pool(config)?;
    let mut conn = pool.get()?;
    let feeds = Feed::get_all(&mut conn)?;
    if feeds.is_empty() {
        println!("No feeds configured.");
        return Ok(());
    }
    println!("Configured feeds:");
    for f in feeds {
        let status = if f.enabled { "enabled" } else { "disabled" };
        println!(
            "ID: {}, Title: {}, URL: {}, Freq: {}s, Chat: {}, Status: {}",
            f.id,
            f.display_title(),
            f.url,
            f.frequency_seconds,
            f.chat_id,
            status
        );
    }
    Ok(())
}

fn bot_add(config: &AppConfig, raw_token: &str, description: Option<&str>) -> AppResult<()> {
    let pool = open_pool(config)?;
    let mut conn = pool.get()?;
    let vault = TokenVault::new(&config.encryption_key)?;
    let bot = vault.store(&mut conn, raw_token, description)?;
    println!(
        "Bot added with ID: {} (token fingerprint ...{})",
        bot.id,
        fingerprint_tail(&bot.token_fingerprint)
    );
    Ok(())
}

fn bot_list(config: &AppConfig) -> AppResult<()> {
    let pool = open_pool(config)?;
    let mut conn = pool.get()?;
    let bots = Bot::get_all(&mut conn)?;
    if bots.is_empty() {
        println!("No bots configured.");
        return Ok(());
    }
    println!("Configured bots:");
    for b in bots {
        println!(
            "ID: {}, Description: '{}', Token fingerprint: ...{}",
            b.id,
            b.description.as_deref().unwrap_or_default(),
            fingerprint_tail(&b.token_fingerprint)
        );
    }
    Ok(())
}

fn fingerprint_tail(fingerprint: &str) -> &str {
    &fingerprint[fingerprint.len().saturating_sub(8)..]
}

#[allow(clippy::too_many_arguments)]
fn proxy_add(
    config: &AppConfig,
    name: &str,
    kind: ProxyKind,
    address: &str,
    username: Option<&str>,
    password: Option<&str>,
    default_rss: bool,
    default_telegram: bool,
) -> AppResult<()> {
    let pool = open_pool(config)?;
    let mut conn = pool.get()?;
    let proxy = NewProxy {
        name,
        kind,
        address,
        username,
        password,
        default_rss,
        default_tg: default_telegram,
    }
    .insert(&mut conn)?;
    println!("Proxy '{}' added with ID: {}", proxy.name, proxy.id);
    Ok(())
}

fn proxy_list(config: &AppConfig) -> AppResult<()> {
    let pool = open_pool(config)?;
    let mut conn = pool.get()?;
    let proxies = Proxy::get_all(&mut conn)?;
    if proxies.is_empty() {
        println!("No proxies configured.");
        return Ok(());
    }
    println!("Configured proxies:");
    for p in proxies {
        let auth = if p.username.is_some() { "yes" } else { "no" };
        let mut flags = String::new();
        if p.default_rss {
            flags.push_str(" [default RSS]");
        }
        if p.default_tg {
            flags.push_str(" [default Telegram]");
        }
        println!(
            "ID: {}, Name: {}, Kind: {}, Address: {}, Auth: {}{}",
            p.id, p.name, p.kind, p.address, auth, flags
        );
    }
    Ok(())
}

#[tokio::main]
async fn proxy_validate(config: &AppConfig, proxy_id: i32, target_url: &str) -> AppResult<()> {
    let pool = open_pool(config)?;
    let proxy = {
        let mut conn = pool.get()?;
        Proxy::get_by_id(&mut conn, proxy_id)?.ok_or_else(|| AppError::not_found("proxy"))?
    };

    println!(
        "Validating proxy {} (ID: {}, {}) against {target_url}...",
        proxy.name, proxy.id, proxy.address
    );

    let client = transport::client_for(Some(&proxy))
        .map_err(|e| AppError::Config(e.to_string()))?;
    let response = client
        .get(target_url)
        .header("User-Agent", "feedgram-proxy-validator/1.0")
        .timeout(Duration::from_secs(15))
        .send()
        .await
        .map_err(|e| AppError::Config(format!("connection test failed: {e}")))?;

    if response.status().is_success() {
        println!("Proxy validation successful (status {}).", response.status());
        Ok(())
    } else {
        Err(AppError::Config(format!(
            "connection test returned status {}",
            response.status()
        )))
    }
}

#[allow(clippy::too_many_arguments)]
fn format_profile_add(
    config: &AppConfig,
    name: &str,
    config_file: Option<&std::path::Path>,
    title_template: Option<String>,
    message_template: Option<String>,
    hashtags: Option<Vec<String>>,
    include_author: bool,
    omit_generic_title_regex: Option<String>,
) -> AppResult<()> {
    let mut profile_config = match config_file {
        Some(path) => {
            let data = std::fs::read_to_string(path)?;
            serde_json::from_str::<FormatProfileConfig>(&data)?
        }
        None => FormatProfileConfig::default(),
    };

    if let Some(tt) = title_template {
        profile_config.title_template = tt;
    }
    if let Some(mt) = message_template {
        profile_config.message_template = mt;
    }
    if let Some(tags) = hashtags {
        profile_config.hashtags = tags;
    }
    if include_author {
        profile_config.include_author = true;
    }
    if let Some(re) = omit_generic_title_regex {
        regex::Regex::new(&re)
            .map_err(|e| AppError::invalid_input("omit-generic-title-regex", &e.to_string()))?;
        profile_config.omit_generic_title_regex = re;
    }

    let config_json = serde_json::to_string(&profile_config)?;
    let pool = open_pool(config)?;
    let mut conn = pool.get()?;
    let profile = NewFormattingProfile {
        name,
        config_json: &config_json,
    }
    .insert(&mut conn)?;
    println!("Formatting profile '{}' added with ID: {}", profile.name, profile.id);
    Ok(())
}

fn format_profile_list(config: &AppConfig) -> AppResult<()> {
    let pool = open_pool(config)?;
    let mut conn = pool.get()?;
    let profiles = FormattingProfile::get_all(&mut conn)?;
    if profiles.is_empty() {
        println!("No formatting profiles configured.");
        return Ok(());
    }
    println!("Configured formatting profiles:");
    for p in profiles {
        println!("ID: {}, Name: {}, Config: {}", p.id, p.name, p.config_json);
    }
    Ok(())
}

fn db_backup(config: &AppConfig, output: Option<PathBuf>) -> AppResult<()> {
    let output = output.unwrap_or_else(|| default_backup_path(&config.database_url));
    let output_str = output.to_string_lossy().into_owned();

    let pool = open_pool(config)?;
    let mut conn = pool.get()?;
    println!(
        "Backing up database from '{}' to '{}'...",
        config.database_url, output_str
    );
    db::backup(&mut conn, &output_str)?;
    println!("Database backup successful.");
    Ok(())
}

fn default_backup_path(database_url: &str) -> PathBuf {
    let path = std::path::Path::new(database_url);
    let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "feedgram.db".to_string());
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    dir.join(format!("{name}-backup-{stamp}.db"))
}

fn db_restore(config: &AppConfig, backup_path: &std::path::Path) -> AppResult<()> {
    println!(
        "WARNING: this will overwrite the current database at '{}' with '{}'.",
        config.database_url,
        backup_path.display()
    );
    print!("Are you sure you want to continue? (yes/no): ");
    use std::io::Write;
    std::io::stdout().flush()?;

    let mut confirm = String::new();
    std::io::stdin().read_line(&mut confirm)?;
    if confirm.trim() != "yes" {
        println!("Restore cancelled.");
        return Ok(());
    }

    db::restore(&config.database_url, &backup_path.to_string_lossy())?;
    println!("Database restore successful. Restart the service if it is running.");
    Ok(())
}
