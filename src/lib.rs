//! Price Watch
//!
//! Batch price-deviation monitoring. Lists of product identifiers are split
//! into fixed-size batches and looked up one at a time against a rate-limited
//! product data API. Sellers listed below a product's historical reference
//! price are recorded as alerts, and each finished job produces a spreadsheet
//! report that is handed to a delivery endpoint.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
