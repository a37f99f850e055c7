use clap::{Parser, Subcommand};
use std::path::Path;

use nocto::app;
use nocto::infrastructure::config::Config;

#[derive(Parser)]
#[command(name = "nocto")]
#[command(about = "A chat bot host with hot-reloadable plugins", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Bot token (overrides config)
    #[arg(short, long)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot
    Run,
    /// Show version
    Version,
    /// Generate default config
    InitConfig,
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            std::process::exit(run_bot(&cli.config, cli.token));
        }
        Commands::Version => {
            println!("nocto v{}", env!("CARGO_PKG_VERSION"));
        }
        Commands::InitConfig => {
            init_config();
        }
    }
}

fn run_bot(config_path: &str, token_override: Option<String>) -> i32 {
    let mut config = if Path::new(config_path).exists() {
        match Config::load(config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("Failed to load config {}: {}", config_path, e);
                return Config::default().exit_codes.bot_start_failed;
            }
        }
    } else {
        tracing::warn!("Config file {} not found, using defaults", config_path);
        Config::default()
    };
    config.apply_env();
    if let Some(token) = token_override {
        config.api.token = Some(token);
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to start async runtime: {}", e);
            return config.exit_codes.bot_start_failed;
        }
    };
    let code = runtime.block_on(app::run(config));
    // Do not wait for a pending stdin read
    runtime.shutdown_background();
    code
}

fn init_config() {
    match Config::default().to_yaml() {
        Ok(yaml) => {
            println!("{}", yaml);
            println!("\nSave this to config.yaml and adjust as needed.");
        }
        Err(e) => tracing::error!("{}", e),
    }
}
