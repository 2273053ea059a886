use anyhow::Context;
use hometech_api::{
    catalog::HttpCatalogClient,
    config::{init_tracing, load_config},
    db::{ensure_schema, establish_connection},
    events::{process_events, EventSender},
    gateway::StripeGateway,
    AppState,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(load_config().context("loading configuration")?);
    init_tracing(&config.log_level, config.log_json);
    info!(environment = %config.environment, "starting hometech-api");

    let db = Arc::new(
        establish_connection(&config)
            .await
            .context("connecting to database")?,
    );
    if config.auto_migrate {
        ensure_schema(&db).await.context("ensuring schema")?;
    }

    let (event_tx, event_rx) = mpsc::channel(1024);
    let event_sender = Arc::new(EventSender::new(event_tx));
    tokio::spawn(process_events(event_rx));

    let gateway = Arc::new(StripeGateway::new(
        &config.gateway_api_base,
        &config.gateway_secret_key,
        &config.currency,
    ));
    let catalog = Arc::new(HttpCatalogClient::new(
        &config.catalog_api_base,
        config.catalog_api_token.clone(),
    ));

    let state = AppState::new(db, config.clone(), event_sender, gateway, catalog);

    let app = hometech_api::app_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
