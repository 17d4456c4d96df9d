use anyhow::Result;
use common::lodestone::LodestoneClient;
use notifier::center::NotificationCenter;
use notifier::config::NotifierConfig;
use notifier::registry::InstanceRegistry;
use notifier::source::EventSource;
use notifier::{api, metrics, subscribers};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const NOTIFICATION_BUFFER: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(NotifierConfig::default_config_path);
    let config = NotifierConfig::load(&config_path)?;

    let (dispatch, _otel_guard) = common::observability::build_dispatch(
        "lodestone-notifier",
        &config.observability.log_level,
    );
    tracing::dispatcher::set_global_default(dispatch).map_err(anyhow::Error::msg)?;

    tracing::info!(path = %config_path, "lodestone-notifier starting");

    if let Some(port) = config.observability.prometheus_port {
        metrics::install_prometheus(port)?;
        tracing::info!(port, "prometheus exporter listening");
    }
    metrics::describe();

    let client = Arc::new(LodestoneClient::new(
        &config.lodestone.base_url,
        config.request_timeout(),
    )?);
    let center = NotificationCenter::new(NOTIFICATION_BUFFER);

    let registry = InstanceRegistry::new();
    registry.register_effects(&center);

    let shutdown = CancellationToken::new();
    let logger = tokio::spawn(subscribers::run_logging_subscriber(
        center.clone(),
        shutdown.clone(),
    ));

    let mut source = EventSource::new(
        Arc::clone(&client),
        center.clone(),
        config.stream.settings(),
    );
    source.set_token(config.lodestone.token.clone());
    if !source.is_running() {
        tracing::warn!("no lodestone token configured; event stream idle");
    }

    let state = Arc::new(api::AppState {
        center: center.clone(),
        registry,
        started_at: chrono::Utc::now(),
        api_key: config.server.api_key.clone(),
    });
    let app = api::router(state);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(addr = %bind_addr, "starting notifier HTTP server");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down");
            server_shutdown.cancel();
        })
        .await?;

    source.shutdown().await;
    shutdown.cancel();
    if let Err(e) = logger.await {
        tracing::warn!(error = %e, "logging subscriber did not shut down cleanly");
    }

    tracing::info!("lodestone-notifier stopped");
    Ok(())
}
