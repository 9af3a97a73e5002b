use clap::Parser;
use feedgram::cli::{self, Cli};
use feedgram::config::AppConfig;

fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        if let Err(e) = dotenvy::from_path(path) {
            eprintln!("Error: failed to load config file {}: {e}", path.display());
            std::process::exit(1);
        }
    }

    env_logger::init_from_env(env_logger::Env::new().filter_or("FG_LOG_LEVEL", "info"));

    let config = AppConfig::from_env();
    if let Err(e) = cli::execute(cli, &config) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
