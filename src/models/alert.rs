use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A seller detected below the historical reference price. Never updated once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub job_id: Uuid,
    pub identifier: String,
    pub seller_name: String,
    pub current_price: f64,
    pub historical_price: f64,
    pub price_change_percent: f64,
    pub payload: Option<serde_json::Value>,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAlert {
    pub job_id: Uuid,
    pub identifier: String,
    pub seller_name: String,
    pub current_price: f64,
    pub historical_price: f64,
    pub price_change_percent: f64,
    pub payload: Option<serde_json::Value>,
}
