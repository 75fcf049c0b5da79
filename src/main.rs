//! mobilterm - Remote control for tmux coding sessions
//!
//! Run with `mobilterm` or `mobilterm --help` for usage.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use mobilterm::{
    APP_NAME, AppContext, Config, Credentials, SessionStatus, VERSION, gateway,
    tmux::TmuxExecutor,
};

#[derive(Parser)]
#[command(name = APP_NAME)]
#[command(version = VERSION)]
#[command(about = "Remote control for tmux-hosted coding agent sessions")]
#[command(long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server (default)
    Serve,

    /// Scan tmux once and print sessions grouped by project
    List,

    /// Print the auth token, creating it if needed
    Token,

    /// Show configuration
    Config {
        /// Initialize config file with defaults
        #[arg(long)]
        init: bool,
    },
}

fn setup_logging(debug: bool, log_file: Option<&PathBuf>) -> Result<()> {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        // Use info level for our crate, warn for dependencies
        EnvFilter::new("info")
            .add_directive("tower_http=warn".parse()?)
            .add_directive("hyper=warn".parse()?)
    };

    if let Some(path) = log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(file).with_target(false))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(false))
            .with(filter)
            .init();
    }

    Ok(())
}

fn build_executor(config: &Config) -> TmuxExecutor {
    TmuxExecutor::with_max_concurrent(config.max_concurrent_tmux).with_timeout(config.tmux_timeout())
}

fn status_icon(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Working => "●",
        SessionStatus::Idle => "◐",
        SessionStatus::Shell => "$",
        SessionStatus::Stale => "○",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install color-eyre error hooks
    color_eyre::install()?;

    let cli = Cli::parse();

    // Load configuration
    let loaded = match cli.config {
        Some(ref path) => Config::load_from(path),
        None => Config::load(),
    };
    let config = loaded.unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config, using defaults: {}", e);
        Config::default()
    });

    // Ensure required directories exist
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Failed to create directories: {}", e);
    }

    setup_logging(cli.debug || config.debug, config.log_file.as_ref())?;

    match cli.command {
        None | Some(Commands::Serve) => {
            info!("Starting mobilterm v{}", VERSION);

            let executor = build_executor(&config);
            executor.check_installed().await?;

            let credentials = Credentials::load_or_generate(&config.token_file_path()?)?;
            let address = config.listen_address();
            let ctx = AppContext::new(config, Arc::new(executor), credentials)?;

            match ctx.registry.discover().await {
                Ok(report) => info!("Found {} existing session(s)", report.total),
                Err(e) => warn!("Initial discovery failed: {}", e),
            }

            println!("mobilterm running on {}", address);
            println!("Auth token: {}", ctx.credentials.token());
            println!("Connect: {}", ctx.config.connect_url(ctx.credentials.token()));

            gateway::serve(ctx).await?;
        }

        Some(Commands::List) => {
            let executor = build_executor(&config);
            executor.check_installed().await?;

            // The token is irrelevant to a one-shot listing
            let ctx = AppContext::new(config, Arc::new(executor), Credentials::from_token(""))?;
            ctx.registry.discover().await?;

            let groups = ctx.registry.grouped_sessions().await;
            if groups.is_empty() {
                println!("No tmux sessions.");
                return Ok(());
            }

            for group in groups {
                println!(
                    "  {} ({} session(s), {} stale)",
                    group.project_name, group.total_count, group.stale_count
                );
                for view in group.sessions {
                    println!(
                        "    {} {} [{}] {}",
                        status_icon(view.status),
                        view.meta.session_name,
                        view.status,
                        view.meta.command
                    );
                }
                println!();
            }
        }

        Some(Commands::Token) => {
            let path = config.token_file_path()?;
            let credentials = Credentials::load_or_generate(&path)?;
            println!("{}", credentials.token());
        }

        Some(Commands::Config { init }) => {
            if init {
                let path = match cli.config {
                    Some(path) => path,
                    None => Config::config_file_path()?,
                };
                config.save_to(&path)?;
                println!("Configuration initialized at {:?}", path);
            } else {
                println!("Configuration:");
                println!("{}", toml::to_string_pretty(&config)?);
                println!("\nConfig file: {:?}", Config::config_file_path()?);
                println!("Data dir: {:?}", Config::data_dir()?);
                println!("Token file: {:?}", config.token_file_path()?);
                println!("Projects dir: {:?}", config.projects_dir()?);
            }
        }
    }

    Ok(())
}
