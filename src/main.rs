use std::sync::Arc;

use listenroom::{
    common::{
        banner::{BuildInfo, print_banner},
        clock::SystemClock,
        logger,
        types::AnyResult,
    },
    configs::Config,
    server::AppState,
    sources::SourceManager,
    transport,
};
use tracing::info;

#[tokio::main]
async fn main() -> AnyResult<()> {
    let config = Config::load()?;
    logger::init(&config);

    let address = config.server.address();
    print_banner(&BuildInfo::default(), &address);

    let source_manager = Arc::new(SourceManager::new(&config));
    info!(
        "Track lookup sources: [{}]",
        source_manager.source_names().join(", ")
    );

    let shared_state = Arc::new(AppState::new(
        config,
        source_manager,
        Arc::new(SystemClock),
    )?);
    let app = transport::app(shared_state.clone());

    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("listenroom listening on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(
        "Shut down with {} active room(s)",
        shared_state.registry.len()
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let term = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let term = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = term => {},
    }
    info!("Shutdown signal received");
}
