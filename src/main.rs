use std::net::SocketAddr;

use anyhow::Context;
use sentinel::application::bootstrap::Application;
use sentinel::config::Config;
use tracing::{error, info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("loading configuration")?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_max_level(Level::TRACE)
        .json()
        .init();

    info!(addr = %config.http_addr, "starting sentinel");

    let addr: SocketAddr = config.http_addr.parse().context("parsing SENTINEL_HTTP_ADDR")?;
    let app = std::sync::Arc::new(Application::build(config).await?);

    let worker_handles = app.spawn();
    let router = sentinel::interfaces::http::router(app.clone());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding HTTP listener on {addr}"))?;

    let shutdown = app.shutdown.clone();
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
            })
            .await
    });

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown signal received");
    app.shutdown();

    if let Err(err) = server_handle.await.context("joining HTTP server task")? {
        error!(%err, "HTTP server exited with error");
    }

    for handle in worker_handles {
        let _ = handle.await;
    }

    info!("sentinel stopped");
    Ok(())
}
