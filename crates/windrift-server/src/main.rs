mod scheduler;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use windrift_db::Database;
use windrift_engine::{Engine, EngineConfig, LogNotifier, OpenWeatherMap, ZipHabitability};
use windrift_types::TickSummary;

type AppEngine = Arc<Engine<OpenWeatherMap, ZipHabitability, LogNotifier>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "windrift=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let api_key = std::env::var("OPENWEATHERMAP_API_KEY").unwrap_or_default();
    if api_key.is_empty() {
        eprintln!("FATAL: OPENWEATHERMAP_API_KEY is unset.");
        eprintln!("       The engine cannot fetch wind data without it.");
        eprintln!("       Set it in your .env file and restart.");
        std::process::exit(1);
    }

    let db_path = std::env::var("WINDRIFT_DB_PATH").unwrap_or_else(|_| "windrift.db".into());
    let host = std::env::var("WINDRIFT_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("WINDRIFT_PORT")
        .unwrap_or_else(|_| "3400".into())
        .parse()?;
    let tick_interval_secs: u64 = std::env::var("WINDRIFT_TICK_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(900); // 15 minutes

    let config = EngineConfig {
        // Each tick advances notes by exactly the wall time between ticks
        elapsed_hours: tick_interval_secs as f64 / 3600.0,
        drift_factor: env_f64("WINDRIFT_DRIFT_FACTOR", windrift_engine::DRIFT_FACTOR),
        discovery_radius_miles: env_f64("WINDRIFT_DISCOVERY_RADIUS_MILES", 10.0),
        habitability_radius_miles: env_f64("WINDRIFT_HABITABILITY_RADIUS_MILES", 20.0),
        ..EngineConfig::default()
    };
    let tick_deadline = config.tick_deadline;

    // Init database
    let db = Arc::new(Database::open(&PathBuf::from(&db_path))?);

    // Engine with explicit collaborators — no process-wide clients
    let wind = OpenWeatherMap::new(api_key, config.wind_timeout)?;
    let habitability = ZipHabitability::new(db.clone());
    let engine: AppEngine = Arc::new(Engine::new(db, wind, habitability, LogNotifier, config));

    // Scheduled ticks in the background
    tokio::spawn(scheduler::run_tick_loop(
        engine.clone(),
        tick_interval_secs,
        tick_deadline,
    ));
    info!("Tick scheduler running every {}s", tick_interval_secs);

    let app = Router::new()
        .route("/tick", post(trigger_tick))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(engine);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Windrift server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn env_f64(name: &str, default: f64) -> f64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// POST /tick — run one engine tick now and report the summary. Errors only
/// when the active-note read itself fails; everything else is isolated
/// inside the tick.
async fn trigger_tick(
    State(engine): State<AppEngine>,
) -> Result<Json<TickSummary>, (StatusCode, String)> {
    let deadline = engine.config().tick_deadline;
    match tokio::time::timeout(deadline, engine.tick()).await {
        Ok(Ok(summary)) => Ok(Json(summary)),
        Ok(Err(e)) => Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
        Err(_) => Err((
            StatusCode::GATEWAY_TIMEOUT,
            "tick exceeded deadline".to_string(),
        )),
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
