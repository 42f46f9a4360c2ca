use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::{ensure_parent_dir, Settings};
use crate::export::ExportDir;
use crate::persist::{PersistError, Persister};
use crate::storage::SqliteStore;

pub mod routes;

/// Server state
pub struct AppState {
    pub persister: Persister,
    /// Reject duplicate node ids and dangling edges before persisting
    pub strict: bool,
}

/// Open both stores, creating the table and export directory if needed.
///
/// Any failure here is fatal: the process must not serve traffic.
pub fn open_persister(settings: &Settings) -> Result<Persister, PersistError> {
    ensure_parent_dir(&settings.database).map_err(|e| {
        PersistError::ConfigurationError(format!("cannot create database directory: {e}"))
    })?;
    let store = SqliteStore::open(&settings.database).map_err(|e| {
        PersistError::ConfigurationError(format!(
            "cannot open database {}: {e}",
            settings.database.display()
        ))
    })?;
    let exports = ExportDir::open(&settings.export_dir).map_err(|e| {
        PersistError::ConfigurationError(format!(
            "cannot prepare export directory {}: {e}",
            settings.export_dir.display()
        ))
    })?;
    Ok(Persister::new(store, exports))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(routes::root))
        .route("/save_dag", post(routes::save_dag))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(settings: Settings) -> anyhow::Result<()> {
    let persister = open_persister(&settings)?;
    tracing::info!(
        "Persisting to {} and {}",
        settings.database.display(),
        settings.export_dir.display()
    );

    let state = Arc::new(AppState {
        persister,
        strict: settings.strict,
    });
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port).parse()?;
    tracing::info!("Starting server on {} (strict: {})", addr, settings.strict);
    println!("🌍 Server running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
