//! Point Timer - A local-first work timer for logging points against projects
//! 
//! This is the main entry point for the point-timer server.

use std::sync::Arc;
use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use point_timer::{
    config::Config,
    state::AppState,
    api::create_router,
    services::FileStore,
    tasks::store_watcher_task,
    utils::{shutdown_signal, SystemClock},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing with appropriate log level
    tracing_subscriber::fmt()
        .with_env_filter(format!("point_timer={},tower_http=info", config.log_level()))
        .init();

    info!("Starting point-timer server v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: host={}, port={}, data_dir={}, max={}h, projects={:?}",
          config.host, config.port, config.data_dir.display(), config.max_hours, config.projects);

    let store = Arc::new(
        FileStore::open(&config.data_dir)
            .with_context(|| format!("Failed to open data directory {}", config.data_dir.display()))?,
    );

    // Create application state; this resumes a timer left running by a previous run
    let state = AppState::launch(
        store.clone(),
        Arc::new(SystemClock),
        config.max_duration(),
        config.projects.clone(),
        config.port,
        config.host.clone(),
    );

    // Pick up timer changes made by other processes sharing the data directory
    tokio::spawn(store_watcher_task(
        Arc::clone(&store),
        config.watch_interval(),
        state.shutdown.child_token(),
    ));

    // Create HTTP router with all endpoints
    let app = create_router(Arc::clone(&state));

    // Bind to the specified address
    let addr = config.address();
    let listener = TcpListener::bind(&addr).await?;

    info!("Server running on http://{}", addr);
    info!("Endpoints:");
    info!("  GET    /timer              - Timer snapshot and status");
    info!("  POST   /timer/start        - Start timing a project");
    info!("  POST   /timer/stop         - Stop the timer");
    info!("  GET    /timer/stopped      - Session waiting to be logged");
    info!("  DELETE /timer/stopped      - Discard the waiting session");
    info!("  POST   /timer/stopped/log  - Log the waiting session as points");
    info!("  GET    /points             - Logged point entries");
    info!("  GET    /projects           - Known projects");
    info!("  PUT    /projects/:id       - Add a project");
    info!("  DELETE /projects/:id       - Remove a project");
    info!("  GET    /health             - Health check");

    // Setup graceful shutdown
    tokio::spawn(shutdown_signal(state.shutdown.clone()));
    let shutdown = state.shutdown.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await });

    if let Err(e) = server.await {
        tracing::error!("Server error: {}", e);
    }

    state.shutdown();
    info!("Server shutdown complete");
    Ok(())
}
