//! Main entry point for the Rivalry rating service
//!
//! Runs the health and metrics server over a persisted rating book, and
//! offers maintenance commands for recalculation, leaderboards and drafts.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use rivalry::config::{validate_config, AppConfig};
use rivalry::game::{Board, BookStorage, GameService, JsonFileStorage, LeaderboardQuery};
use rivalry::metrics::{HealthServer, HealthServerConfig, MetricsCollector};
use rivalry::rating::RatingEngine;
use rivalry::utils::SystemClock;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Rivalry - Elo ratings for multi-sided games
#[derive(Parser)]
#[command(
    name = "rivalry",
    version,
    about = "Elo rating engine for multi-sided games with squads and collectives",
    long_about = "Rivalry tracks games between any number of sides, rates individuals, \
                 community members, anonymous squads and named collectives, and replays \
                 history whenever a confirmed result changes."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Rating book snapshot override
    #[arg(long, value_name = "FILE", help = "Override the rating book snapshot path")]
    state: Option<PathBuf>,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve health, metrics and stats endpoints (default)
    Serve {
        /// HTTP port override
        #[arg(long, value_name = "PORT")]
        port: Option<u16>,
    },
    /// Replay confirmed games and save the book
    Recalculate {
        /// Only games completed at or after this RFC 3339 timestamp
        #[arg(long, value_name = "TIMESTAMP")]
        since: Option<DateTime<Utc>>,
    },
    /// Print a leaderboard
    Leaderboard {
        #[arg(long, value_enum, default_value_t = BoardArg::Global)]
        board: BoardArg,
        /// Context for every board except global
        #[arg(long, value_name = "CONTEXT")]
        context: Option<String>,
        /// Only entities active within this many days
        #[arg(long, value_name = "DAYS")]
        active_days: Option<i64>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Print the pick order for a game
    Draft {
        #[arg(value_name = "GAME_ID")]
        game_id: Uuid,
    },
    /// Validate configuration and exit
    CheckConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BoardArg {
    Global,
    Context,
    Season,
    AllTime,
    Squads,
}

impl BoardArg {
    fn into_board(self, context: Option<String>) -> Result<Board> {
        if self == BoardArg::Global {
            return Ok(Board::Global);
        }
        let context = context.ok_or_else(|| anyhow!("--context is required for this board"))?;
        Ok(match self {
            BoardArg::Global => Board::Global,
            BoardArg::Context => Board::Context(context),
            BoardArg::Season => Board::CollectiveSeason(context),
            BoardArg::AllTime => Board::CollectiveAllTime(context),
            BoardArg::Squads => Board::Squads(context),
        })
    }
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// Load and merge configuration from environment, file and CLI arguments
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }
    if args.debug {
        config.service.log_level = "debug".to_string();
    }
    if let Some(state) = &args.state {
        config.service.state_path = state.clone();
    }

    validate_config(&config)?;
    Ok(config)
}

/// Build the service over the stored book, or an empty one
async fn load_service(
    config: &AppConfig,
    storage: &JsonFileStorage,
    metrics: Arc<MetricsCollector>,
) -> Result<Arc<GameService>> {
    let engine = RatingEngine::new(&config.rating).context("Invalid rating configuration")?;
    let service = match storage.load().await? {
        Some(book) => GameService::from_book(engine, Arc::new(SystemClock), metrics, book),
        None => {
            info!(
                "No rating book at {}, starting empty",
                storage.path().display()
            );
            GameService::new(engine, Arc::new(SystemClock), metrics)
        }
    };
    Ok(Arc::new(service))
}

fn display_startup_banner(config: &AppConfig) {
    info!("Rivalry Rating Service");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!(
        "   Health: {}:{}",
        config.service.health_host, config.service.health_port
    );
    info!("   State: {}", config.service.state_path.display());
    info!("   Starting rating: {}", config.rating.starting_rating);
}

async fn serve(config: AppConfig, port: Option<u16>) -> Result<()> {
    display_startup_banner(&config);

    let storage = JsonFileStorage::new(&config.service.state_path);
    let metrics = Arc::new(MetricsCollector::new()?);
    let service = load_service(&config, &storage, metrics.clone()).await?;

    let health_config = HealthServerConfig {
        host: config.service.health_host.clone(),
        port: port.unwrap_or(config.service.health_port),
    };
    let server = Arc::new(HealthServer::new(health_config, metrics).with_service(service.clone()));

    let server_task = {
        let server = server.clone();
        tokio::spawn(async move {
            if let Err(e) = server.start().await {
                error!("Health server failed: {}", e);
            }
        })
    };

    info!("Rivalry is running, press Ctrl+C to shut down");
    wait_for_shutdown_signal().await;
    info!("Shutdown signal received, saving rating book...");

    server.stop();
    let save = async {
        storage.save(&service.snapshot().await).await?;
        server_task.await.context("Health server task panicked")
    };

    match tokio::time::timeout(config.shutdown_timeout(), save).await {
        Ok(Ok(())) => info!("Graceful shutdown completed"),
        Ok(Err(e)) => {
            error!("Shutdown failed: {}", e);
            return Err(e);
        }
        Err(_) => warn!("Shutdown timeout exceeded, forcing exit"),
    }

    Ok(())
}

async fn recalculate(config: AppConfig, since: Option<DateTime<Utc>>) -> Result<()> {
    let storage = JsonFileStorage::new(&config.service.state_path);
    let service = load_service(&config, &storage, Arc::new(MetricsCollector::new()?)).await?;

    let report = match since {
        Some(since) => service.recalculate_since(since).await?,
        None => service.recalculate_all().await?,
    };
    storage.save(&service.snapshot().await).await?;

    println!(
        "Unwound {} and replayed {} games",
        report.unwound, report.replayed
    );
    Ok(())
}

async fn leaderboard(config: AppConfig, query: LeaderboardQuery) -> Result<()> {
    let storage = JsonFileStorage::new(&config.service.state_path);
    let service = load_service(&config, &storage, Arc::new(MetricsCollector::new()?)).await?;

    for row in service.leaderboard(&query).await? {
        println!(
            "{:>4}  {:<40} {:>6}  (peak {:>6}, {}W/{}L)",
            row.rank,
            row.entity.to_string(),
            row.rating,
            row.peak,
            row.wins,
            row.losses
        );
    }
    Ok(())
}

async fn draft(config: AppConfig, game_id: Uuid) -> Result<()> {
    let storage = JsonFileStorage::new(&config.service.state_path);
    let service = load_service(&config, &storage, Arc::new(MetricsCollector::new()?)).await?;

    for (index, pick) in service.draft_order(game_id).await?.iter().enumerate() {
        println!(
            "{:>3}. side {} -> {}",
            index + 1,
            pick.side_id,
            pick.member_id
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {:#}", e);
        std::process::exit(1);
    });

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    match args.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => serve(config, port).await,
        Command::Recalculate { since } => recalculate(config, since).await,
        Command::Leaderboard {
            board,
            context,
            active_days,
            limit,
        } => {
            let mut query = LeaderboardQuery::new(board.into_board(context)?).limit(limit);
            if let Some(days) = active_days {
                query = query.active_within(chrono::Duration::days(days));
            }
            leaderboard(config, query).await
        }
        Command::Draft { game_id } => draft(config, game_id).await,
        Command::CheckConfig => {
            display_startup_banner(&config);
            info!("Configuration validation successful");
            Ok(())
        }
    }
}
