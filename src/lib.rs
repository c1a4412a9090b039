//! Data collector. Stores prompt/response conversations sent over HTTP.

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod store;

use std::sync::Arc;

use api::{AppState, collector_routes};
use config::Config;
use store::{ConversationStore, LibSqlBackend};

/// Open the store, bind, and serve until the process exits.
///
/// Store and bind failures are returned before anything is listening.
pub async fn run(config: Config) -> error::Result<()> {
    let store: Arc<dyn ConversationStore> = Arc::new(
        LibSqlBackend::open(&config.database_url, config.database_auth_token.as_ref()).await?,
    );

    let app = collector_routes(AppState::new(store, config.admin_token.clone()));

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Listening");

    axum::serve(listener, app).await?;
    Ok(())
}
