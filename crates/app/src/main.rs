/// Storefront Backend Application
///
/// Main entry point for the pickup-order storefront service. The
/// application serves the store catalog and product listing, tracks
/// per-session order drafts, and gates order submission on the proximity
/// check between the delivery point and the selected store.
///
/// # Architecture
///
/// - Repository layer for data access (stores, products, orders)
/// - Service layer for the eligibility gate and order flow
/// - In-memory catalog loaded once at startup
/// - HTTP layer for map, form, and submit interactions
/// - Metrics for monitoring
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_postgres::{Client, NoTls};
use tracing::{error, info, warn};

use app_config::AppConfig;
use catalog::StoreCatalog;
use repository::{PgOrdersRepository, PgProductsRepository, PgStoresRepository};
use server::Server;
use service::{OrderServiceImpl, SessionStore};

/// Initialize the tracing subscriber for logging
fn init_logger() -> Result<()> {
    tracing_subscriber::fmt::init();
    Ok(())
}

/// Opens a dedicated Postgres connection and spawns its driver task.
///
/// Each repository gets its own client because `tokio_postgres::Client`
/// does not implement `Clone`.
async fn connect(dsn: &str, purpose: &'static str) -> Result<Client> {
    let (client, connection) = tokio_postgres::connect(dsn, NoTls)
        .await
        .with_context(|| format!("Failed to connect to database for {purpose}"))?;
    info!("Connected to database for {}", purpose);
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!("Database connection error ({}): {}", purpose, e);
        }
    });
    Ok(client)
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(err) = init_logger() {
        eprintln!("Failed to initialize logger: {}", err);
        return Err(anyhow::anyhow!("Failed to initialize logger"));
    }

    info!("Storefront backend starting...");

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;

    // Initialize database pool and apply migrations
    let db_pool = match db::init_db_pool(&config).await {
        Ok(pool) => {
            info!("Database initialized successfully");
            pool
        }
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            return Err(anyhow::anyhow!("Failed to initialize database"));
        }
    };

    let dsn = db::dsn(&config);
    let stores_repo = PgStoresRepository::new(connect(&dsn, "stores repository").await?);
    let products_repo = PgProductsRepository::new(connect(&dsn, "products repository").await?);
    let orders_repo = PgOrdersRepository::new(connect(&dsn, "orders repository").await?);

    // Load the store catalog once; an empty catalog is a valid state in
    // which no store can be selected.
    let store_catalog = Arc::new(StoreCatalog::new());
    match store_catalog.load(&stores_repo).await {
        Ok(count) => info!("Loaded {} stores into the catalog", count),
        Err(e) => {
            error!("Failed to load store catalog: {}", e);
            warn!("Continuing with an empty catalog; no store will be selectable");
        }
    }

    let sessions = Arc::new(SessionStore::new());
    let order_service = Arc::new(OrderServiceImpl::new(db_pool, orders_repo));

    // Try to find the static directory in multiple locations
    let static_paths = [config.static_dir.clone(), "/app/static".to_string()];
    let mut static_dir = config.static_dir.clone();
    for path in static_paths {
        if std::path::Path::new(&path).exists() {
            static_dir = path;
            break;
        }
    }
    info!("Using static directory: {}", static_dir);

    let http_server = Server::new(
        config.http_port.to_string(),
        store_catalog,
        sessions,
        Arc::new(products_repo),
        order_service,
        static_dir,
    );

    http_server.start().await?;

    info!("Application stopped");
    Ok(())
}
