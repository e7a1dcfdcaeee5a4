//! # Data Repository Layer
//!
//! Repository traits and PostgreSQL implementations for the storefront
//! entities: stores, products, orders. The stores repository backs the
//! in-memory catalog; the orders repository is the submission sink invoked
//! only after an order has passed the eligibility gate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::{DeliveryType, Order, Product, Store};
use thiserror::Error;
use tokio_postgres::{Client, Row, Transaction};

/// Error types that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database-related errors, wrapping the underlying PostgreSQL error
    #[error("Database error: {0}")]
    Db(#[from] tokio_postgres::Error),
    /// No result found.
    #[error("Not found")]
    NotFound,
    /// A stored column value could not be mapped to a domain type.
    #[error("Invalid column value: {0}")]
    InvalidValue(String),
}

/// # StoresRepository
///
/// Read interface over the `stores` table. The catalog is fetched once at
/// session start; stores are never written by this service.
#[async_trait]
pub trait StoresRepository: Send + Sync {
    /// Fetch every store, for catalog loading and map rendering.
    async fn get_all(&self) -> Result<Vec<Store>, RepositoryError>;

    /// Fetch a single store by its id.
    async fn get_by_id(&self, store_id: &str) -> Result<Store, RepositoryError>;
}

/// PostgreSQL implementation of the StoresRepository trait.
pub struct PgStoresRepository {
    /// PostgreSQL client for database operations
    db: Client,
}

impl PgStoresRepository {
    pub fn new(db: Client) -> Self {
        Self { db }
    }
}

fn store_from_row(row: &Row) -> Store {
    Store {
        id: row.get("id"),
        name: row.get("name"),
        address: row.get("address"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
    }
}

#[async_trait]
impl StoresRepository for PgStoresRepository {
    async fn get_all(&self) -> Result<Vec<Store>, RepositoryError> {
        let query = r#"
            SELECT id, name, address, latitude, longitude FROM stores
        "#;
        let rows = self.db.query(query, &[]).await?;
        Ok(rows.iter().map(store_from_row).collect())
    }

    async fn get_by_id(&self, store_id: &str) -> Result<Store, RepositoryError> {
        let query = r#"
            SELECT id, name, address, latitude, longitude
            FROM stores WHERE id = $1
        "#;
        let row = self.db.query_opt(query, &[&store_id]).await?;
        match row {
            Some(row) => Ok(store_from_row(&row)),
            None => Err(RepositoryError::NotFound),
        }
    }
}

/// # ProductsRepository
///
/// Read interface over the `products` table. Listings are ordered by
/// popularity score, highest first.
#[async_trait]
pub trait ProductsRepository: Send + Sync {
    async fn get_all_by_score(&self) -> Result<Vec<Product>, RepositoryError>;
}

/// PostgreSQL implementation of the ProductsRepository trait.
pub struct PgProductsRepository {
    /// PostgreSQL client for database operations
    db: Client,
}

impl PgProductsRepository {
    pub fn new(db: Client) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProductsRepository for PgProductsRepository {
    async fn get_all_by_score(&self) -> Result<Vec<Product>, RepositoryError> {
        let query = r#"
            SELECT id, name, description, price, category, score
            FROM products ORDER BY score DESC
        "#;
        let rows = self.db.query(query, &[]).await?;
        Ok(rows
            .into_iter()
            .map(|row| Product {
                id: row.get("id"),
                name: row.get("name"),
                description: row.get("description"),
                price: row.get("price"),
                category: row.get("category"),
                score: row.get("score"),
            })
            .collect())
    }
}

/// # OrdersRepository
///
/// Write interface for accepted pickup orders. Insertion happens only
/// after eligibility has passed, inside the service-level transaction.
#[async_trait]
pub trait OrdersRepository: Send + Sync {
    /// Insert an order record (outside of transaction).
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError>;

    /// Insert an order record in a transaction.
    async fn insert_tx(&self, tx: &Transaction<'_>, order: &Order) -> Result<(), RepositoryError>;

    /// Get an order by its id.
    async fn get_by_id(&self, order_id: &str) -> Result<Order, RepositoryError>;
}

/// PostgreSQL implementation of the OrdersRepository trait.
pub struct PgOrdersRepository {
    /// PostgreSQL client for database operations
    db: Client,
}

impl PgOrdersRepository {
    pub fn new(db: Client) -> Self {
        Self { db }
    }
}

const INSERT_ORDER: &str = r#"
    INSERT INTO orders (id, user_id, store_id, status, delivery_type, created_at)
    VALUES ($1, $2, $3, $4, $5, $6)
"#;

fn order_from_row(row: &Row) -> Result<Order, RepositoryError> {
    let delivery_type: String = row.get("delivery_type");
    let delivery_type = match delivery_type.as_str() {
        "direct" => DeliveryType::Direct,
        "indirect" => DeliveryType::Indirect,
        other => {
            return Err(RepositoryError::InvalidValue(format!(
                "unknown delivery_type '{other}'"
            )))
        }
    };
    let created_at: DateTime<Utc> = row.get("created_at");
    Ok(Order {
        id: row.get("id"),
        user_id: row.get("user_id"),
        store_id: row.get("store_id"),
        status: row.get("status"),
        delivery_type,
        created_at,
    })
}

#[async_trait]
impl OrdersRepository for PgOrdersRepository {
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError> {
        self.db
            .execute(
                INSERT_ORDER,
                &[
                    &order.id,
                    &order.user_id,
                    &order.store_id,
                    &order.status,
                    &order.delivery_type.as_str(),
                    &order.created_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn insert_tx(&self, tx: &Transaction<'_>, order: &Order) -> Result<(), RepositoryError> {
        tx.execute(
            INSERT_ORDER,
            &[
                &order.id,
                &order.user_id,
                &order.store_id,
                &order.status,
                &order.delivery_type.as_str(),
                &order.created_at,
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_by_id(&self, order_id: &str) -> Result<Order, RepositoryError> {
        let query = r#"
            SELECT id, user_id, store_id, status, delivery_type, created_at
            FROM orders WHERE id = $1
        "#;
        let row = self.db.query_opt(query, &[&order_id]).await?;
        match row {
            Some(row) => order_from_row(&row),
            None => Err(RepositoryError::NotFound),
        }
    }
}
