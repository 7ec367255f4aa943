use std::sync::Arc;
use telemetry_gateway::{
    api::{create_router, AppState},
    config::Config,
    server::Server,
    sink::StdoutSink,
};
use tokio_stream::StreamExt;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "telemetry_gateway=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting telemetry-gateway");

    let config_path =
        std::env::var("APP_CONFIG").unwrap_or_else(|_| "config/config.yaml".to_string());
    let config = Config::load(&config_path)?;
    info!("Configuration loaded from: {}", config_path);

    // Readings go to stdout, the operational log to stderr
    let mut server = Server::new(config.server_config(), Arc::new(StdoutSink));
    server.start().await?;
    let mut server_errors = server
        .errors()
        .ok_or_else(|| anyhow::anyhow!("server error stream already taken"))?;

    let state = AppState::new(
        server.registry(),
        server.session_tracker(),
        config.query_timeout(),
    );
    let app = create_router(state);

    info!("Starting HTTP server on {}", config.api.listen_addr);
    let listener = tokio::net::TcpListener::bind(&config.api.listen_addr).await?;
    let http_shutdown = server.shutdown_token();
    let http = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(http_shutdown.cancelled_owned())
            .await
    });

    let fatal = tokio::select! {
        signal = shutdown_signal() => {
            match signal {
                Ok(name) => info!(signal = name, "shutdown requested, draining device sessions"),
                Err(e) => error!(error = %e, "signal handler failed, shutting down"),
            }
            None
        }
        err = server_errors.next() => err,
    };

    server.stop();
    server.wait().await;
    info!("All device sessions closed");

    match http.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("HTTP server error: {}", e),
        Err(e) => error!("HTTP server task failed: {}", e),
    }

    if let Some(e) = fatal {
        error!("Device server failed: {}", e);
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves with the name of the first termination signal received.
async fn shutdown_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.map(|_| "SIGINT"),
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map(|_| "Ctrl+C")
    }
}
