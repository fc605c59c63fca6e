use std::net::SocketAddr;

use skillpath_backend::config::Config;
use skillpath_backend::services::analysis_provider::AnalysisService;
use skillpath_backend::state::AppState;
use skillpath_backend::{create_app, db, logging};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = logging::init_tracing(&config);

    let pool = match db::connect_from_env().await {
        Ok(pool) => pool,
        Err(err) => {
            tracing::error!(error = %err, "failed to open database");
            std::process::exit(1);
        }
    };
    if let Err(err) = db::init_schema(&pool).await {
        tracing::error!(error = %err, "failed to apply schema");
        std::process::exit(1);
    }

    let analysis = AnalysisService::from_env();
    if !analysis.is_available() {
        tracing::warn!("analysis collaborator not configured; weak-concept analysis will degrade to question mappings");
    }

    let state = AppState::new(pool, analysis, config.fallback_concepts.clone());
    let app = create_app(state);

    let addr = config.bind_addr();
    tracing::info!(%addr, "skillpath-backend listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("bind listener failed");

    let server = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal());

    if let Err(e) = server.await {
        tracing::error!(error = %e, "server error");
    }

    tracing::info!("HTTP server stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
