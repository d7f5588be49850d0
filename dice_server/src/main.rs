//! Dice baccarat server.
//!
//! Spawns a room actor per chat on demand, recovers rounds persisted by a
//! previous process and serves the HTTP control API.

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Error};
use dice_baccarat::{
    LogChannel, MemoryStore, OutboundChannel, PgStore, RoomManager, Store, db::Database,
};
use dice_server::{
    api,
    config::ServerConfig,
    logging, metrics,
    telegram::TelegramChannel,
};
use log::{info, warn};
use pico_args::Arguments;

const HELP: &str = "\
Run the dice baccarat server

USAGE:
  dice_server [OPTIONS]

OPTIONS:
  --bind          IP:PORT  HTTP bind address          [default: env SERVER_BIND or 127.0.0.1:6969]
  --db-url        URL      Database connection string [default: env DATABASE_URL, else in-memory]
  --metrics-bind  IP:PORT  Prometheus scrape address  [default: env METRICS_BIND, else disabled]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  TELEGRAM_BOT_TOKEN       Bot token; without it narration goes to the log
  TELEGRAM_API_BASE        Bot API base URL [default: https://api.telegram.org]
  BETTING_WINDOW_SECS      Betting window length [default: 30]
  MAX_BET_PER_CLASS        Per-class stake ceiling [default: 10000]
  MAX_BET_TOTAL            Aggregate stake ceiling [default: 25000]
  RUST_LOG                 Log filter
";

struct Args {
    bind: Option<SocketAddr>,
    database_url: Option<String>,
    metrics_bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        return Ok(());
    }

    let args = Args {
        bind: pargs.opt_value_from_str("--bind")?,
        database_url: pargs.opt_value_from_str("--db-url")?,
        metrics_bind: pargs.opt_value_from_str("--metrics-bind")?,
    };

    logging::init();

    let config = ServerConfig::from_env(args.bind, args.database_url, args.metrics_bind)?;
    config.validate()?;

    if let Some(addr) = config.metrics_bind {
        metrics::init_metrics(addr).map_err(anyhow::Error::msg)?;
        info!("Metrics exported at http://{}/metrics", addr);
    }

    let (store, database): (Arc<dyn Store>, Option<Arc<Database>>) = match &config.database {
        Some(db_config) => {
            info!("Connecting to database");
            let db = Database::new(db_config)
                .await
                .context("Failed to connect to database")?;
            db.migrate().await.context("Failed to run migrations")?;
            info!("Database connected successfully");
            (Arc::new(PgStore::new(db.pool().clone())), Some(Arc::new(db)))
        }
        None => {
            warn!("DATABASE_URL not set, rounds will not survive a restart");
            (Arc::new(MemoryStore::new()), None)
        }
    };

    let channel: Arc<dyn OutboundChannel> = match &config.telegram {
        Some(telegram) => Arc::new(
            TelegramChannel::new(telegram).context("Failed to build Telegram client")?,
        ),
        None => {
            warn!("TELEGRAM_BOT_TOKEN not set, narrating to the log");
            Arc::new(LogChannel)
        }
    };

    let manager = Arc::new(RoomManager::new(config.game.clone(), store, channel));
    let recovered = manager
        .load_existing_rooms()
        .await
        .context("Failed to recover rooms")?;
    info!("Recovered {} room(s)", recovered);

    let app = api::create_router(api::AppState {
        manager: manager.clone(),
        database: database.clone(),
    });

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down server...");
    manager.shutdown().await;
    if let Some(db) = database.and_then(Arc::into_inner) {
        db.close().await;
    }

    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
