//! Price deviation detection.
//!
//! A product's historical reference price is the mean of its recorded
//! history over a look-back window. Every current seller listing priced
//! below that reference is reported as off-price; sellers are never
//! compared with each other.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::product::{ProductRecord, ProductResponse, PRICE_NEW, PRICE_USED};

const MINUTES_PER_DAY: i64 = 24 * 60;

/// A current listing with a usable (positive) price.
#[derive(Debug, Clone, Serialize)]
pub struct SellerPrice {
    pub seller_id: Option<String>,
    pub seller_name: String,
    pub price: f64,
    pub is_fba: bool,
    pub condition: String,
}

/// One known point of the price history. Timestamps are Unix minutes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub timestamp: i64,
    pub price: f64,
    pub is_new: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct OffPriceSeller {
    pub seller_id: Option<String>,
    pub seller_name: String,
    pub current_price: f64,
    pub historical_price: f64,
    pub price_change: f64,
    pub price_change_percent: f64,
    pub is_fba: bool,
    pub condition: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PriceAnalysis {
    pub identifier: String,
    pub product_id: Option<String>,
    pub title: Option<String>,
    pub off_price_sellers: Vec<OffPriceSeller>,
    pub total_sellers: usize,
    pub historical_price: Option<f64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PriceAnalyzer {
    history_days: i64,
}

impl Default for PriceAnalyzer {
    fn default() -> Self {
        Self::new(30)
    }
}

impl PriceAnalyzer {
    pub fn new(history_days: i64) -> Self {
        Self { history_days }
    }

    pub fn analyze(&self, identifier: &str, payload: &serde_json::Value) -> PriceAnalysis {
        self.analyze_at(identifier, payload, Utc::now())
    }

    /// Same as [`analyze`](Self::analyze) with an explicit clock.
    pub fn analyze_at(
        &self,
        identifier: &str,
        payload: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> PriceAnalysis {
        let mut analysis = PriceAnalysis {
            identifier: identifier.to_string(),
            ..Default::default()
        };

        let product = match ProductResponse::from_payload(payload) {
            Ok(Some(product)) => product,
            Ok(None) => {
                analysis.error = Some("No product data found".to_string());
                return analysis;
            }
            Err(e) => {
                tracing::warn!(identifier, error = %e, "Malformed product payload");
                analysis.error = Some(format!("Malformed product payload: {}", e));
                return analysis;
            }
        };

        analysis.product_id = product.asin.clone();
        analysis.title = product.title.clone();

        let sellers = current_prices(&product);
        analysis.total_sellers = sellers.len();

        let history = price_history(&product);
        let reference = historical_reference(&history, self.history_days, now.timestamp() / 60);
        analysis.historical_price = reference;

        match reference {
            Some(reference) => {
                analysis.off_price_sellers = detect_off_price(&sellers, reference);
            }
            None => {
                tracing::debug!(identifier, "No price history available for comparison");
            }
        }

        analysis
    }
}

/// Current listings with a strictly positive price.
pub fn current_prices(product: &ProductRecord) -> Vec<SellerPrice> {
    product
        .sellers
        .iter()
        .filter_map(|seller| {
            seller.positive_price().map(|price| SellerPrice {
                seller_id: seller.seller_id.clone(),
                seller_name: seller.display_name().to_string(),
                price,
                is_fba: seller.is_fba,
                condition: seller.condition.clone().unwrap_or_else(|| "New".to_string()),
            })
        })
        .collect()
}

/// Known history points. The new price is preferred, the used price is the
/// fallback; negative values mark unknown prices and are skipped.
pub fn price_history(product: &ProductRecord) -> Vec<PricePoint> {
    let known = |row: &[Option<f64>], index: usize| row.get(index).copied().flatten().filter(|p| *p >= 0.0);

    product
        .csv
        .iter()
        .filter(|row| row.len() >= 3)
        .filter_map(|row| {
            let timestamp = row[0]? as i64;
            match (known(row, PRICE_NEW), known(row, PRICE_USED)) {
                (Some(price), _) => Some(PricePoint {
                    timestamp,
                    price,
                    is_new: true,
                }),
                (None, Some(price)) => Some(PricePoint {
                    timestamp,
                    price,
                    is_new: false,
                }),
                (None, None) => None,
            }
        })
        .collect()
}

/// Mean price over the last `days` days before `now_minutes`, falling back to
/// the mean of the whole series when the window is empty.
pub fn historical_reference(history: &[PricePoint], days: i64, now_minutes: i64) -> Option<f64> {
    if history.is_empty() {
        return None;
    }

    let cutoff = now_minutes - days * MINUTES_PER_DAY;
    let recent: Vec<f64> = history
        .iter()
        .filter(|p| p.timestamp >= cutoff)
        .map(|p| p.price)
        .collect();

    if recent.is_empty() {
        mean(history.iter().map(|p| p.price))
    } else {
        mean(recent.into_iter())
    }
}

/// Every seller priced strictly below `reference`.
pub fn detect_off_price(sellers: &[SellerPrice], reference: f64) -> Vec<OffPriceSeller> {
    if reference <= 0.0 {
        return Vec::new();
    }

    sellers
        .iter()
        .filter(|s| s.price > 0.0 && s.price < reference)
        .map(|s| {
            let price_change = s.price - reference;
            OffPriceSeller {
                seller_id: s.seller_id.clone(),
                seller_name: s.seller_name.clone(),
                current_price: s.price,
                historical_price: reference,
                price_change,
                price_change_percent: price_change / reference * 100.0,
                is_fba: s.is_fba,
                condition: s.condition.clone(),
            }
        })
        .collect()
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}
