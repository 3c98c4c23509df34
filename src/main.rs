use std::net::SocketAddr;
use std::sync::Arc;

use axum::{serve, Extension};
use dotenvy::dotenv;
use amr_workbench::{
    api,
    infrastructure::{config::Config, db, state::AppState, storage},
    jobs, telemetry,
};
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    telemetry::init();
    let config = Arc::new(Config::from_env()?);
    let pool = db::connect(&config.database).await?;
    db::run_migrations(&pool).await?;
    info!("database migrations completed successfully");
    let storage = storage::build_storage(&config.storage)?;
    let state = Arc::new(AppState::new(Arc::clone(&config), pool, storage)?);

    let router = api::build_router()
        .layer(Extension(Arc::clone(&state)))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.app));

    let addr: SocketAddr = config.bind_address().parse()?;
    info!(%addr, "starting annotation workbench api");

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let _export_worker_handle = jobs::spawn_export_worker(Arc::clone(&state));

    let server = serve(listener, router.into_make_service());

    tokio::select! {
        res = server => {
            if let Err(err) = res {
                warn!(error = ?err, "server exited with error");
            }
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received");
        }
    }

    Ok(())
}

fn cors_layer(app: &amr_workbench::infrastructure::config::AppConfig) -> CorsLayer {
    if app.cors_origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<_> = app
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    let layer = CorsLayer::new()
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
        .allow_origin(origins);
    if app.cors_allow_credentials {
        layer.allow_credentials(true)
    } else {
        layer
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
