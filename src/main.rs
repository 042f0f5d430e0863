mod channels;
mod config;
mod conversation;
mod core;
mod cron_utils;
mod dispatcher;
mod labels;
mod scheduler;
mod session;
mod state;
mod traits;
mod types;

#[cfg(test)]
mod testing;

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Handle CLI arguments
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        match args[1].as_str() {
            "--version" | "-V" => {
                println!("schedule-bot {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" => {
                println!("schedule-bot {}", env!("CARGO_PKG_VERSION"));
                println!("{}\n", env!("CARGO_PKG_DESCRIPTION"));
                println!("Usage: schedule-bot [OPTIONS]\n");
                println!("Configuration is read from config.toml (override with SCHEDULE_BOT_CONFIG)");
                println!("and the environment:");
                println!("  TELEGRAM_BOT_TOKEN    Bot token (required)");
                println!("  DB_PATH               Schedule file [default: ./data/schedules.json]");
                println!("  LOG_LEVEL             Log filter when RUST_LOG is unset [default: info]");
                println!("\nOptions:");
                println!("  -h, --help       Print help");
                println!("  -V, --version    Print version");
                return Ok(());
            }
            _ => {}
        }
    }

    let config_path = std::env::var("SCHEDULE_BOT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));
    let config = match config::AppConfig::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config load failed: {}", e);
            return Err(e);
        }
    };

    // Tracing: RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.log_level))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Run async
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(crate::core::run(config))
}
