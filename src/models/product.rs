//! Typed view over the product data API response.
//!
//! Payloads are stored verbatim as JSON on items and alerts; these types are
//! only used when the analyzer or the report compiler needs to read them.

use serde::{Deserialize, Serialize};

/// Index of the "new" price in `stats.current` and in each history row.
pub const PRICE_NEW: usize = 1;

/// Index of the "used" price in each history row.
pub const PRICE_USED: usize = 2;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductResponse {
    #[serde(default)]
    pub products: Vec<ProductRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductRecord {
    #[serde(default)]
    pub asin: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default, rename = "current_sellers")]
    pub sellers: Vec<SellerListing>,
    #[serde(default)]
    pub stats: Option<ProductStats>,
    #[serde(default, rename = "buyBoxSellerId")]
    pub buy_box_seller_id: Option<String>,
    /// Price history rows: `[minute_timestamp, new_price, used_price]`, `-1` meaning unknown.
    #[serde(default)]
    pub csv: Vec<Vec<Option<f64>>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SellerListing {
    #[serde(default, rename = "sellerId")]
    pub seller_id: Option<String>,
    #[serde(default, rename = "sellerName")]
    pub seller_name: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default, rename = "isFBA")]
    pub is_fba: bool,
    #[serde(default)]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductStats {
    #[serde(default, rename = "buyBoxPrice")]
    pub buy_box_price: Option<f64>,
    #[serde(default)]
    pub current: Vec<Option<f64>>,
}

impl ProductResponse {
    /// Returns the first product record, if the response carries one.
    pub fn from_payload(payload: &serde_json::Value) -> Result<Option<ProductRecord>, serde_json::Error> {
        let response: ProductResponse = serde_json::from_value(payload.clone())?;
        Ok(response.products.into_iter().next())
    }

    /// True when the API answered successfully but knows no product for the code.
    pub fn is_empty_payload(payload: &serde_json::Value) -> bool {
        payload
            .get("products")
            .and_then(|p| p.as_array())
            .map(|p| p.is_empty())
            .unwrap_or(true)
    }
}

impl SellerListing {
    /// Listed price, only when strictly positive.
    pub fn positive_price(&self) -> Option<f64> {
        self.price.filter(|p| *p > 0.0)
    }

    pub fn display_name(&self) -> &str {
        self.seller_name.as_deref().unwrap_or("Unknown")
    }
}

impl ProductRecord {
    /// Seller listing with the lowest positive price.
    pub fn lowest_listing(&self) -> Option<&SellerListing> {
        self.sellers
            .iter()
            .filter(|s| s.positive_price().is_some())
            .min_by(|a, b| {
                a.positive_price()
                    .unwrap_or(f64::MAX)
                    .total_cmp(&b.positive_price().unwrap_or(f64::MAX))
            })
    }

    pub fn listing_by_seller(&self, seller_id: &str) -> Option<&SellerListing> {
        self.sellers
            .iter()
            .find(|s| s.seller_id.as_deref() == Some(seller_id))
    }
}
