use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use shelfwatch::{
    api::{create_router, AppState},
    db::{create_redis_client, Cache, LocalBlobStore},
    services::{AppleBooksLookup, NytListProvider},
    Config,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("shelfwatch=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    // Lookup caching is optional
    let (cache, cache_writer) = match &config.redis_url {
        Some(url) => {
            let client = create_redis_client(url)?;
            let (cache, handle) = Cache::new(client).await;
            tracing::info!("Lookup cache enabled");
            (Some(cache), Some(handle))
        }
        None => {
            tracing::info!("REDIS_URL not set, lookups are not cached");
            (None, None)
        }
    };

    let store = Arc::new(LocalBlobStore::new(config.storage_root.clone()));
    let lists = Arc::new(NytListProvider::new(
        config.nyt_api_key.clone(),
        config.nyt_api_url.clone(),
    ));
    let lookup = Arc::new(AppleBooksLookup::new(config.lookup_api_url.clone(), cache));

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!(
        storage_root = %config.storage_root.display(),
        list = %config.list_name,
        "Starting shelfwatch"
    );

    let app = create_router(AppState::new(config, store, lists, lookup));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(addr = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(handle) = cache_writer {
        handle.shutdown().await;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
}
