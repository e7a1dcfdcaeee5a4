//! Business logic layer for pickup ordering.
//!
//! This module holds the order-eligibility gate, the per-session order
//! composition flow, and the [`OrderService`] trait with its transactional
//! implementation [`OrderServiceImpl`].
//!
//! # Features
//! - Pure eligibility decision combining store selection and geodesic distance.
//! - An explicit, re-enterable draft flow (`Composing -> Validating ->
//!   {Eligible | Rejected} -> Submitted`).
//! - Atomic persistence of accepted orders.
//! - Dependency injection for testability and loose coupling.
//! - Well-typed error handling via [`OrderRejection`] and [`ServiceError`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use deadpool_postgres::{Pool, PoolError};
use model::{
    coordinates_in_range, DeliveryRequest, Order, Store, ORDER_STATUS_PENDING,
};
use repository::{OrdersRepository, RepositoryError};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::instrument;
use uuid::Uuid;

/// Maximum allowed distance between the delivery point and the selected
/// store, in kilometers. Fixed business constant, not configurable.
pub const ORDER_RADIUS_KM: f64 = 1.0;

/// Why a submission attempt was turned down. All variants are non-fatal;
/// the draft returns to composing and the user may retry.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OrderRejection {
    /// Submission attempted with no active store selection.
    #[error("No store selected; please pick a store on the map")]
    NoStoreSelected,
    /// The delivery point lies outside the pickup radius of the store.
    #[error("Delivery point is {distance_km:.2} km from the store; the limit is {ORDER_RADIUS_KM} km")]
    TooFar { distance_km: f64 },
    /// A required enumerated field was left unset.
    #[error("Required field '{0}' is not set")]
    InvalidField(&'static str),
    /// The delivery coordinates are not finite or fall outside geographic range.
    #[error("Coordinates ({latitude}, {longitude}) are outside the valid range")]
    InvalidCoordinates { latitude: f64, longitude: f64 },
}

/// The eligibility gate: decides whether an order for the given delivery
/// point may proceed against the currently resolved store selection.
///
/// Pure function of its arguments; no I/O, no side effects. A delivery
/// point at exactly [`ORDER_RADIUS_KM`] is accepted — only strictly
/// greater distances are rejected.
pub fn evaluate(
    selection: Option<&Store>,
    latitude: f64,
    longitude: f64,
) -> Result<(), OrderRejection> {
    let store = selection.ok_or(OrderRejection::NoStoreSelected)?;
    let distance_km = geo::distance_km(store.latitude, store.longitude, latitude, longitude);
    if distance_km > ORDER_RADIUS_KM {
        return Err(OrderRejection::TooFar { distance_km });
    }
    Ok(())
}

/// Per-session order composition flow.
///
/// Holds the draft [`DeliveryRequest`] plus the rejection from the last
/// failed submit, which is retained until the next edit or submit attempt.
/// The flow is re-enterable indefinitely: a successful submit resets it to
/// the default composing state.
#[derive(Debug, Clone, Default)]
pub struct OrderFlow {
    draft: DeliveryRequest,
    rejection: Option<OrderRejection>,
}

impl OrderFlow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current store selection unconditionally. Selection
    /// itself is always legal; validation happens at submit time.
    pub fn select_store(&mut self, store_id: impl Into<String>) {
        self.rejection = None;
        self.draft.store_id = Some(store_id.into());
    }

    /// The id of the currently selected store, if any. Callers resolve it
    /// against the catalog rather than holding a copy of the store.
    pub fn selected_store_id(&self) -> Option<&str> {
        self.draft.store_id.as_deref()
    }

    pub fn set_product_type(&mut self, product_type: model::ProductType) {
        self.rejection = None;
        self.draft.product_type = Some(product_type);
    }

    pub fn set_delivery_type(&mut self, delivery_type: model::DeliveryType) {
        self.rejection = None;
        self.draft.delivery_type = Some(delivery_type);
    }

    pub fn set_coordinates(&mut self, latitude: f64, longitude: f64) {
        self.rejection = None;
        self.draft.latitude = latitude;
        self.draft.longitude = longitude;
    }

    pub fn draft(&self) -> &DeliveryRequest {
        &self.draft
    }

    /// Rejection from the last submit attempt, if it has not been cleared
    /// by an edit since.
    pub fn last_rejection(&self) -> Option<&OrderRejection> {
        self.rejection.as_ref()
    }

    /// Attempt submission against the resolved store selection.
    ///
    /// Checks run in a fixed order: required enumerated fields first, then
    /// coordinate ranges, then the distance gate — an unset product or
    /// delivery type never reaches distance evaluation. On success the
    /// finalized request is returned and the flow resets to the default
    /// composing state; on rejection the draft is kept and the reason
    /// recorded.
    pub fn submit(
        &mut self,
        selection: Option<&Store>,
    ) -> Result<DeliveryRequest, OrderRejection> {
        match self.validate(selection) {
            Ok(()) => {
                let mut request = std::mem::take(&mut self.draft);
                // The weak store reference may have been re-resolved to a
                // fresher record than the id the draft carried.
                request.store_id = selection.map(|s| s.id.clone());
                self.rejection = None;
                Ok(request)
            }
            Err(rejection) => {
                self.rejection = Some(rejection.clone());
                Err(rejection)
            }
        }
    }

    fn validate(&self, selection: Option<&Store>) -> Result<(), OrderRejection> {
        if self.draft.product_type.is_none() {
            return Err(OrderRejection::InvalidField("product_type"));
        }
        if self.draft.delivery_type.is_none() {
            return Err(OrderRejection::InvalidField("delivery_type"));
        }
        if !coordinates_in_range(self.draft.latitude, self.draft.longitude) {
            return Err(OrderRejection::InvalidCoordinates {
                latitude: self.draft.latitude,
                longitude: self.draft.longitude,
            });
        }
        evaluate(selection, self.draft.latitude, self.draft.longitude)
    }
}

/// Thread-safe map of session id to [`OrderFlow`]. One draft per session;
/// unknown sessions start from the default composing state.
#[derive(Debug, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, OrderFlow>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a closure against the session's flow under the write lock,
    /// creating a fresh flow for unknown sessions.
    pub async fn with_flow<F, T>(&self, session_id: &str, f: F) -> T
    where
        F: FnOnce(&mut OrderFlow) -> T,
    {
        let mut map = self.inner.write().await;
        let flow = map.entry(session_id.to_string()).or_default();
        f(flow)
    }

    /// A cloned snapshot of the session's flow (None if never touched).
    pub async fn snapshot(&self, session_id: &str) -> Option<OrderFlow> {
        let map = self.inner.read().await;
        map.get(session_id).cloned()
    }
}

/// The main error type for all operations in [`OrderService`] and
/// [`OrderServiceImpl`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The submission was turned down by validation or the eligibility gate.
    #[error("Order rejected: {0}")]
    Rejected(#[from] OrderRejection),
    /// A repository (database) operation failed.
    #[error("Database error: {0}")]
    Db(#[from] RepositoryError),
    /// Failed to obtain a database connection from the pool.
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),
    /// Some unexpected or unhandled error.
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Trait describing persistence of accepted orders.
///
/// Implementations are invoked only after the eligibility gate has passed
/// and are expected to guarantee atomicity via a transaction.
#[async_trait]
pub trait OrderService: Send + Sync {
    /// Atomically persists an accepted submission as a pending order.
    ///
    /// # Arguments
    /// * `user_id` - The authenticated user placing the order.
    /// * `request` - The finalized delivery request returned by a
    ///   successful [`OrderFlow::submit`].
    ///
    /// # Errors
    /// Returns [`ServiceError::Rejected`] if the request is structurally
    /// incomplete, [`ServiceError::Db`] for DB-level errors, or
    /// [`ServiceError::Pool`] if a connection cannot be obtained.
    async fn place_order(
        &self,
        user_id: &str,
        request: &DeliveryRequest,
    ) -> Result<Order, ServiceError>;

    /// Retrieves an order by its id.
    async fn get_order_by_id(&self, order_id: &str) -> Result<Order, ServiceError>;
}

/// Async implementation of [`OrderService`] using the repository pattern.
pub struct OrderServiceImpl<R> {
    db_pool: Pool,
    orders_repo: R,
}

impl<R> OrderServiceImpl<R>
where
    R: OrdersRepository + Send + Sync,
{
    /// Constructs a new [`OrderServiceImpl`] from the provided dependencies.
    ///
    /// # Arguments
    /// * `db_pool` - The Postgres connection pool to use for transactions.
    /// * `orders_repo` - The repository for order records.
    pub fn new(db_pool: Pool, orders_repo: R) -> Self {
        Self {
            db_pool,
            orders_repo,
        }
    }

    /// Re-checks that the finalized request carries everything the order
    /// record needs. The eligibility gate has already run; this guards
    /// against callers bypassing [`OrderFlow::submit`].
    fn validate_request(&self, request: &DeliveryRequest) -> Result<(), ServiceError> {
        if request.store_id.as_deref().is_none_or(str::is_empty) {
            return Err(ServiceError::Rejected(OrderRejection::NoStoreSelected));
        }
        if request.product_type.is_none() {
            return Err(ServiceError::Rejected(OrderRejection::InvalidField(
                "product_type",
            )));
        }
        if request.delivery_type.is_none() {
            return Err(ServiceError::Rejected(OrderRejection::InvalidField(
                "delivery_type",
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl<R> OrderService for OrderServiceImpl<R>
where
    R: OrdersRepository + Send + Sync,
{
    /// Persists the order inside a single DB transaction. If validation
    /// fails or the insert returns an error, nothing is committed.
    #[instrument(skip(self, request))]
    async fn place_order(
        &self,
        user_id: &str,
        request: &DeliveryRequest,
    ) -> Result<Order, ServiceError> {
        self.validate_request(request)?;

        // validate_request guarantees these are set
        let store_id = request.store_id.clone().unwrap_or_default();
        let delivery_type = request
            .delivery_type
            .ok_or_else(|| ServiceError::Unexpected("delivery_type vanished".into()))?;

        let order = Order {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            store_id,
            status: ORDER_STATUS_PENDING.to_string(),
            delivery_type,
            created_at: Utc::now(),
        };

        let mut client = self.db_pool.get().await.map_err(ServiceError::from)?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| ServiceError::Unexpected(format!("Begin transaction failed: {e}")))?;

        self.orders_repo.insert_tx(&tx, &order).await?;

        tx.commit()
            .await
            .map_err(|e| ServiceError::Unexpected(format!("Commit failed: {e}")))?;

        Ok(order)
    }

    #[instrument(skip(self))]
    async fn get_order_by_id(&self, order_id: &str) -> Result<Order, ServiceError> {
        Ok(self.orders_repo.get_by_id(order_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{DeliveryType, ProductType};

    const PARIS: (f64, f64) = (48.8566, 2.3522);

    fn paris_store() -> Store {
        Store {
            id: "store-paris".to_string(),
            name: "Boulangerie Centrale".to_string(),
            address: "12 Rue de Rivoli, Paris".to_string(),
            latitude: PARIS.0,
            longitude: PARIS.1,
        }
    }

    #[test]
    fn test_evaluate_without_selection_rejects() {
        let result = evaluate(None, PARIS.0, PARIS.1);
        assert_eq!(result, Err(OrderRejection::NoStoreSelected));
    }

    #[test]
    fn test_evaluate_at_store_coordinates_is_eligible() {
        let store = paris_store();
        assert_eq!(evaluate(Some(&store), PARIS.0, PARIS.1), Ok(()));
    }

    #[test]
    fn test_evaluate_distant_point_rejects_with_distance() {
        let store = paris_store();
        match evaluate(Some(&store), 48.9000, PARIS.1) {
            Err(OrderRejection::TooFar { distance_km }) => {
                assert!((distance_km - 4.83).abs() < 0.01, "got {distance_km}");
            }
            other => panic!("expected TooFar, got {other:?}"),
        }
    }

    #[test]
    fn test_evaluate_radius_boundary_is_eligible() {
        // The comparison is strictly-greater: a point sitting on the 1 km
        // radius itself is accepted. A pure-latitude offset of r/R radians
        // puts the delivery point at the radius.
        let store = paris_store();
        let delta_deg = ((ORDER_RADIUS_KM - 1e-9) / geo::EARTH_RADIUS_KM).to_degrees();
        let lat = PARIS.0 + delta_deg;
        let d = geo::distance_km(PARIS.0, PARIS.1, lat, PARIS.1);
        assert!((d - ORDER_RADIUS_KM).abs() < 1e-6, "got {d}");
        assert_eq!(evaluate(Some(&store), lat, PARIS.1), Ok(()));
    }

    #[test]
    fn test_evaluate_just_past_radius_rejects() {
        let store = paris_store();
        let delta_deg = (ORDER_RADIUS_KM * 1.01 / geo::EARTH_RADIUS_KM).to_degrees();
        let result = evaluate(Some(&store), PARIS.0 + delta_deg, PARIS.1);
        assert!(matches!(result, Err(OrderRejection::TooFar { .. })));
    }

    fn composed_flow() -> OrderFlow {
        let mut flow = OrderFlow::new();
        flow.select_store("store-paris");
        flow.set_product_type(ProductType::Cake);
        flow.set_delivery_type(DeliveryType::Direct);
        flow.set_coordinates(PARIS.0, PARIS.1);
        flow
    }

    #[test]
    fn test_reselecting_store_replaces_prior_selection() {
        let mut flow = OrderFlow::new();
        flow.select_store("store-1");
        flow.select_store("store-2");
        assert_eq!(flow.selected_store_id(), Some("store-2"));
    }

    #[test]
    fn test_submit_without_product_type_fails_before_distance() {
        let mut flow = OrderFlow::new();
        flow.set_delivery_type(DeliveryType::Direct);
        // No store selected either, but the field check comes first.
        let result = flow.submit(None);
        assert_eq!(result, Err(OrderRejection::InvalidField("product_type")));
    }

    #[test]
    fn test_submit_without_delivery_type_fails_before_distance() {
        let mut flow = OrderFlow::new();
        flow.set_product_type(ProductType::Bread);
        let store = paris_store();
        // Delivery point far from the store, yet the field check wins.
        flow.set_coordinates(48.9000, PARIS.1);
        let result = flow.submit(Some(&store));
        assert_eq!(result, Err(OrderRejection::InvalidField("delivery_type")));
    }

    #[test]
    fn test_submit_rejects_out_of_range_coordinates() {
        let mut flow = composed_flow();
        flow.set_coordinates(91.0, 0.0);
        let store = paris_store();
        let result = flow.submit(Some(&store));
        assert!(matches!(
            result,
            Err(OrderRejection::InvalidCoordinates { .. })
        ));
    }

    #[test]
    fn test_successful_submit_resets_flow() {
        let mut flow = composed_flow();
        let store = paris_store();
        let request = flow.submit(Some(&store)).expect("should be eligible");
        assert_eq!(request.store_id.as_deref(), Some("store-paris"));
        assert_eq!(request.product_type, Some(ProductType::Cake));

        // Flow is back to the default composing state.
        assert!(flow.selected_store_id().is_none());
        assert!(flow.draft().product_type.is_none());
        assert_eq!(flow.draft().latitude, model::DEFAULT_LATITUDE);
        assert!(flow.last_rejection().is_none());
    }

    #[test]
    fn test_rejection_is_retained_until_next_edit() {
        let mut flow = composed_flow();
        let result = flow.submit(None);
        assert_eq!(result, Err(OrderRejection::NoStoreSelected));
        assert_eq!(
            flow.last_rejection(),
            Some(&OrderRejection::NoStoreSelected)
        );

        // Draft fields survive a rejection.
        assert_eq!(flow.draft().product_type, Some(ProductType::Cake));

        // The next edit clears the message.
        flow.select_store("store-paris");
        assert!(flow.last_rejection().is_none());
    }

    #[tokio::test]
    async fn test_session_store_isolates_sessions() {
        let sessions = SessionStore::new();
        sessions
            .with_flow("alice", |flow| flow.select_store("store-1"))
            .await;
        sessions
            .with_flow("bob", |flow| flow.select_store("store-2"))
            .await;

        let alice = sessions.snapshot("alice").await.unwrap();
        let bob = sessions.snapshot("bob").await.unwrap();
        assert_eq!(alice.selected_store_id(), Some("store-1"));
        assert_eq!(bob.selected_store_id(), Some("store-2"));
        assert!(sessions.snapshot("carol").await.is_none());
    }
}
