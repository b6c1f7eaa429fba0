//! Product API payloads used across the integration tests

#![allow(dead_code)]

use serde_json::{json, Value};

/// Identifier whose product has a seller below its historical mean.
pub const OFF_PRICE_CODE: &str = "111111118";

/// Identifier the product API knows nothing about.
pub const UNKNOWN_CODE: &str = "222222225";

fn minutes_ago(days: i64) -> i64 {
    chrono::Utc::now().timestamp() / 60 - days * 24 * 60
}

/// One product with the given listings and a recent new-price history,
/// one point per day, oldest first.
pub fn product_payload(asin: &str, sellers: &[(&str, f64)], history: &[f64]) -> Value {
    let sellers: Vec<Value> = sellers
        .iter()
        .enumerate()
        .map(|(i, (name, price))| {
            json!({
                "sellerId": format!("S{}", i + 1),
                "sellerName": name,
                "price": price,
                "isFBA": false,
                "condition": "New",
            })
        })
        .collect();

    let csv: Vec<Value> = history
        .iter()
        .enumerate()
        .map(|(i, price)| json!([minutes_ago((history.len() - i) as i64), price, -1]))
        .collect();

    json!({
        "products": [{
            "asin": asin,
            "title": format!("Test product {}", asin),
            "brand": "Acme",
            "current_sellers": sellers,
            "buyBoxSellerId": "S1",
            "csv": csv,
        }]
    })
}

/// History [10, 12, 8] (mean 10) with sellers at 7, 10 and 11.
pub fn off_price_payload() -> Value {
    product_payload(
        "B000TEST01",
        &[("Cheap Co", 7.0), ("Even Co", 10.0), ("Pricey Co", 11.0)],
        &[10.0, 12.0, 8.0],
    )
}

/// Successful response with no product in it.
pub fn empty_payload() -> Value {
    json!({ "products": [] })
}
