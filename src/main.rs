// Define data modules
mod models; // Data structures (Reminder, Rule, Settings)
mod store; // Persistent storage (atomic JSON snapshots)
mod rules; // Next-occurrence computation per rule kind
mod scheduler; // Background loop firing due reminders
mod routes_reminders; // HTTP handlers for reminder & settings APIs
mod routes_preview; // HTTP handler for the cron preview API

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
// Import axum routing utilities and Router
use axum::{
    Router,
    routing::{get, post, put},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::scheduler::Scheduler;
use crate::store::{ReminderStore, StorePaths};

// Shared handler state: the store and the scheduler handle. Handlers
// mutate the store and signal the scheduler; they never see the heap.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ReminderStore>,
    pub scheduler: Arc<Scheduler>,
}

// Runtime configuration, read once at startup. Explicit struct instead
// of path constants so the store and scheduler can be pointed anywhere.
#[derive(Debug)]
struct Config {
    data_dir: PathBuf,
    addr: SocketAddr,
}

impl Config {
    fn from_env() -> anyhow::Result<Config> {
        let data_dir = std::env::var("REMINDERD_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));
        let addr = std::env::var("REMINDERD_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
            .parse()
            .context("invalid REMINDERD_ADDR")?;
        Ok(Config { data_dir, addr })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("reminderd=info")),
        )
        .init();

    let config = Config::from_env()?;
    info!("data directory: {:?}", config.data_dir);

    let store = Arc::new(ReminderStore::open(StorePaths::new(&config.data_dir)));

    // This daemon's presentation layer is the log; a GUI host would pass
    // a callback that marshals onto its own UI thread instead.
    let scheduler = Arc::new(Scheduler::spawn(Arc::clone(&store), |r| {
        info!("reminder fired: {} ({})", r.title, r.id);
        Ok(())
    }));

    let state = AppState {
        store: Arc::clone(&store),
        scheduler: Arc::clone(&scheduler),
    };

    let api = Router::new()
        // reminders
        .route(
            "/reminders",
            get(routes_reminders::list_reminders).post(routes_reminders::create_reminder),
        )
        .route(
            "/reminders/:id",
            put(routes_reminders::update_reminder).delete(routes_reminders::delete_reminder),
        )
        .route("/reminders/:id/enable", post(routes_reminders::enable_reminder))
        .route("/reminders/:id/disable", post(routes_reminders::disable_reminder))
        // cron preview
        .route("/cron/preview", get(routes_preview::get_cron_preview))
        // settings
        .route(
            "/settings",
            get(routes_reminders::get_settings).put(routes_reminders::put_settings),
        )
        .with_state(state);

    let app = Router::new().nest("/api", api);

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .context("bind failed")?;
    info!("listening on http://{}", config.addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Shutdown order: stop the loop, wait for it to exit, then take a
    // final snapshot so firing bookkeeping is not lost.
    scheduler.stop();
    scheduler.join().await;
    if let Err(e) = store.save() {
        warn!("final save failed: {e}");
    }
    info!("shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
