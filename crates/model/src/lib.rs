use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store — a physical pickup location shown on the map.
///
/// Immutable once fetched; owned by the catalog for the session and never
/// mutated by handlers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Store {
    pub id: String,
    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Store {
    /// True when both coordinates are finite and within geographic range.
    pub fn has_valid_coordinates(&self) -> bool {
        coordinates_in_range(self.latitude, self.longitude)
    }
}

/// Product — a catalog entry listed on the storefront.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Price in minor currency units (cents).
    pub price: i32,
    pub category: String,
    /// Popularity score; product listings are ordered by this, descending.
    pub score: i32,
}

/// Order — a persisted pickup order, written once per accepted submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: String,
    #[serde(rename = "user_id")]
    pub user_id: String,
    #[serde(rename = "store_id")]
    pub store_id: String,
    pub status: String,
    #[serde(rename = "delivery_type")]
    pub delivery_type: DeliveryType,
    #[serde(rename = "created_at")]
    pub created_at: DateTime<Utc>,
}

/// Status assigned to a freshly accepted order.
pub const ORDER_STATUS_PENDING: &str = "pending";

/// The fixed set of orderable product kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
    Cake,
    Bread,
    Pizza,
}

impl ProductType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProductType::Cake => "cake",
            ProductType::Bread => "bread",
            ProductType::Pizza => "pizza",
        }
    }
}

/// How the order is handed over at the store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryType {
    Direct,
    Indirect,
}

impl DeliveryType {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryType::Direct => "direct",
            DeliveryType::Indirect => "indirect",
        }
    }
}

/// DeliveryRequest — the order draft assembled during composition.
///
/// `store_id` is a weak reference; it must be re-resolved against the
/// catalog at validation time rather than carrying a copy of the store.
/// Optional fields stay `None` until the user picks a value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryRequest {
    #[serde(rename = "store_id")]
    pub store_id: Option<String>,
    #[serde(rename = "product_type")]
    pub product_type: Option<ProductType>,
    #[serde(rename = "delivery_type")]
    pub delivery_type: Option<DeliveryType>,
    pub latitude: f64,
    pub longitude: f64,
}

/// Default reference point for a fresh draft (Paris city centre).
pub const DEFAULT_LATITUDE: f64 = 48.8566;
pub const DEFAULT_LONGITUDE: f64 = 2.3522;

impl Default for DeliveryRequest {
    fn default() -> Self {
        Self {
            store_id: None,
            product_type: None,
            delivery_type: None,
            latitude: DEFAULT_LATITUDE,
            longitude: DEFAULT_LONGITUDE,
        }
    }
}

/// Checks that a latitude/longitude pair is finite and within
/// [-90, 90] / [-180, 180]. Out-of-range values are an error for the
/// caller to surface, never silently clamped.
pub fn coordinates_in_range(latitude: f64, longitude: f64) -> bool {
    latitude.is_finite()
        && longitude.is_finite()
        && (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_store_from_json() {
        let json = r#"
        {
            "id": "b563feb7-2b84-4b6e-9f01-000000000001",
            "name": "Boulangerie Centrale",
            "address": "12 Rue de Rivoli, Paris",
            "latitude": 48.8566,
            "longitude": 2.3522
        }
        "#;
        let store: Store = serde_json::from_str(json).unwrap();
        assert_eq!(store.name, "Boulangerie Centrale");
        assert!(store.has_valid_coordinates());
    }

    #[test]
    fn test_deserialize_delivery_request() {
        let json = r#"
        {
            "store_id": "store-1",
            "product_type": "cake",
            "delivery_type": "direct",
            "latitude": 48.8566,
            "longitude": 2.3522
        }
        "#;
        let req: DeliveryRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.product_type, Some(ProductType::Cake));
        assert_eq!(req.delivery_type, Some(DeliveryType::Direct));
    }

    #[test]
    fn test_default_draft_uses_reference_point() {
        let draft = DeliveryRequest::default();
        assert!(draft.store_id.is_none());
        assert!(draft.product_type.is_none());
        assert_eq!(draft.latitude, DEFAULT_LATITUDE);
        assert_eq!(draft.longitude, DEFAULT_LONGITUDE);
    }

    #[test]
    fn test_coordinate_range_checks() {
        assert!(coordinates_in_range(0.0, 0.0));
        assert!(coordinates_in_range(-90.0, 180.0));
        assert!(!coordinates_in_range(90.5, 0.0));
        assert!(!coordinates_in_range(0.0, -180.5));
        assert!(!coordinates_in_range(f64::NAN, 0.0));
        assert!(!coordinates_in_range(0.0, f64::INFINITY));
    }

    #[test]
    fn test_enum_wire_names_are_lowercase() {
        assert_eq!(serde_json::to_string(&ProductType::Bread).unwrap(), "\"bread\"");
        assert_eq!(serde_json::to_string(&DeliveryType::Indirect).unwrap(), "\"indirect\"");
    }
}
