//! Report Compiler
//!
//! Turns the completed items of a job, the externally supplied list prices
//! and the detected alerts into a two-sheet spreadsheet.

use chrono::{DateTime, Utc};
use rust_xlsxwriter::{Color, Format, Workbook, XlsxError};
use serde::Serialize;
use std::collections::HashMap;

use crate::models::alert::Alert;
use crate::models::job::Item;
use crate::models::product::{ProductRecord, ProductResponse, PRICE_NEW};

pub const REPORT_SHEET: &str = "Price Report";
pub const ALERTS_SHEET: &str = "Price Alerts";

pub const REPORT_HEADERS: [&str; 12] = [
    "Identifier",
    "Product ID",
    "Title",
    "Brand",
    "Off Price",
    "List Price",
    "Current Price",
    "Price Difference",
    "Buy Box Price",
    "Buy Box Seller",
    "Discount %",
    "URL",
];

pub const ALERT_HEADERS: [&str; 6] = [
    "Identifier",
    "Seller Name",
    "Current Price",
    "Historical Price",
    "Price Change %",
    "Detected At",
];

const NOT_AVAILABLE: &str = "N/A";
const PRODUCT_URL_BASE: &str = "https://www.amazon.com/dp/";

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Failed to write spreadsheet: {0}")]
    Xlsx(#[from] XlsxError),
}

/// One rendered line of the price report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportRow {
    pub identifier: String,
    pub product_id: Option<String>,
    pub title: Option<String>,
    pub brand: Option<String>,
    pub off_price: bool,
    pub list_price: Option<f64>,
    pub current_price: Option<f64>,
    pub price_difference: f64,
    pub buy_box_price: Option<f64>,
    pub buy_box_seller: Option<String>,
    pub discount_percent: f64,
    pub url: Option<String>,
}

impl ReportRow {
    fn build(item: &Item, list_price: Option<f64>) -> Self {
        let product = item
            .payload
            .as_ref()
            .and_then(|payload| match ProductResponse::from_payload(payload) {
                Ok(product) => product,
                Err(e) => {
                    tracing::warn!(identifier = %item.identifier, error = %e, "Unreadable payload in report");
                    None
                }
            });

        let Some(product) = product else {
            return Self {
                identifier: item.identifier.clone(),
                product_id: None,
                title: None,
                brand: None,
                off_price: false,
                list_price,
                current_price: None,
                price_difference: 0.0,
                buy_box_price: None,
                buy_box_seller: None,
                discount_percent: 0.0,
                url: None,
            };
        };

        let (buy_box_price, buy_box_seller) = resolve_buy_box(&product);
        let current_price = resolve_current_price(&product);

        let (price_difference, discount_percent, off_price) = match (list_price, buy_box_price) {
            (Some(list), Some(buy_box)) => {
                let difference = list - buy_box;
                let discount = if list > 0.0 { difference / list * 100.0 } else { 0.0 };
                (difference, discount, list > buy_box)
            }
            _ => (0.0, 0.0, false),
        };

        Self {
            identifier: item.identifier.clone(),
            url: product.asin.as_ref().map(|asin| format!("{}{}", PRODUCT_URL_BASE, asin)),
            product_id: product.asin,
            title: product.title,
            brand: product.brand,
            off_price,
            list_price,
            current_price,
            price_difference,
            buy_box_price,
            buy_box_seller,
            discount_percent,
        }
    }

    /// Cell text in [`REPORT_HEADERS`] order.
    pub fn cells(&self) -> Vec<String> {
        vec![
            self.identifier.clone(),
            text_or_na(self.product_id.as_deref()),
            text_or_na(self.title.as_deref()),
            text_or_na(self.brand.as_deref()),
            if self.off_price { "Yes" } else { "No" }.to_string(),
            format_money(self.list_price),
            format_money(self.current_price),
            format_money(Some(self.price_difference)),
            format_money(self.buy_box_price),
            text_or_na(self.buy_box_seller.as_deref()),
            format_percent(Some(self.discount_percent)),
            text_or_na(self.url.as_deref()),
        ]
    }
}

/// Buy-box price and seller: aggregate stats, then the buy-box seller's own
/// listing, then the cheapest listing.
fn resolve_buy_box(product: &ProductRecord) -> (Option<f64>, Option<String>) {
    let matched = product
        .buy_box_seller_id
        .as_deref()
        .and_then(|id| product.listing_by_seller(id));
    let seller_name = matched
        .map(|listing| listing.display_name().to_string())
        .or_else(|| product.buy_box_seller_id.clone());

    let stats_price = product
        .stats
        .as_ref()
        .and_then(|stats| stats.buy_box_price)
        .filter(|p| *p > 0.0);
    if let Some(price) = stats_price {
        return (Some(price), seller_name);
    }

    if let Some(price) = matched.and_then(|listing| listing.positive_price()) {
        return (Some(price), seller_name);
    }

    match product.lowest_listing() {
        Some(listing) => (
            listing.positive_price(),
            Some(listing.display_name().to_string()),
        ),
        None => (None, None),
    }
}

fn resolve_current_price(product: &ProductRecord) -> Option<f64> {
    product
        .stats
        .as_ref()
        .and_then(|stats| stats.current.get(PRICE_NEW).copied().flatten())
        .filter(|p| *p > 0.0)
        .or_else(|| product.lowest_listing().and_then(|l| l.positive_price()))
}

/// Compiled report, ready to be rendered.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    pub rows: Vec<ReportRow>,
    pub alerts: Vec<Alert>,
}

impl Report {
    pub fn total_processed(&self) -> usize {
        self.rows.len()
    }

    pub fn off_price_count(&self) -> usize {
        self.rows.iter().filter(|r| r.off_price).count()
    }

    /// Header row followed by one line per row.
    pub fn table(&self) -> Vec<Vec<String>> {
        std::iter::once(REPORT_HEADERS.iter().map(|h| h.to_string()).collect())
            .chain(self.rows.iter().map(ReportRow::cells))
            .collect()
    }

    pub fn alert_table(&self) -> Vec<Vec<String>> {
        std::iter::once(ALERT_HEADERS.iter().map(|h| h.to_string()).collect())
            .chain(self.alerts.iter().map(|alert| {
                vec![
                    alert.identifier.clone(),
                    alert.seller_name.clone(),
                    format_money(Some(alert.current_price)),
                    format_money(Some(alert.historical_price)),
                    format_percent(Some(alert.price_change_percent)),
                    alert.detected_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                ]
            }))
            .collect()
    }

    pub fn to_xlsx(&self) -> Result<Vec<u8>, ReportError> {
        let mut workbook = Workbook::new();

        let header = Format::new()
            .set_bold()
            .set_font_color(Color::White)
            .set_background_color(Color::RGB(0x1F4E78));
        let highlight = Format::new().set_background_color(Color::RGB(0xFFF2CC));

        let sheet = workbook.add_worksheet();
        sheet.set_name(REPORT_SHEET)?;
        for (row_index, cells) in self.table().iter().enumerate() {
            let format = match row_index {
                0 => Some(&header),
                n if self.rows[n - 1].off_price => Some(&highlight),
                _ => None,
            };
            write_row(sheet, row_index as u32, cells, format)?;
        }
        sheet.set_freeze_panes(1, 0)?;
        sheet.set_column_width(2, 48)?;
        sheet.set_column_width(11, 36)?;

        let sheet = workbook.add_worksheet();
        sheet.set_name(ALERTS_SHEET)?;
        for (row_index, cells) in self.alert_table().iter().enumerate() {
            let format = (row_index == 0).then_some(&header);
            write_row(sheet, row_index as u32, cells, format)?;
        }
        sheet.set_freeze_panes(1, 0)?;
        sheet.set_column_width(1, 32)?;

        Ok(workbook.save_to_buffer()?)
    }
}

fn write_row(
    sheet: &mut rust_xlsxwriter::Worksheet,
    row: u32,
    cells: &[String],
    format: Option<&Format>,
) -> Result<(), XlsxError> {
    for (col, value) in cells.iter().enumerate() {
        match format {
            Some(format) => sheet.write_string_with_format(row, col as u16, value, format)?,
            None => sheet.write_string(row, col as u16, value)?,
        };
    }
    Ok(())
}

pub struct ReportCompiler;

impl ReportCompiler {
    /// `items` are expected in batch sequence, then position order.
    pub fn compile(items: &[Item], list_prices: &HashMap<String, f64>, alerts: Vec<Alert>) -> Report {
        let rows = items
            .iter()
            .map(|item| ReportRow::build(item, list_prices.get(&item.identifier).copied()))
            .collect();

        Report { rows, alerts }
    }
}

/// `{name}_{YYYYmmdd_HHMMSS}.xlsx`, keeping only alphanumerics, `-` and `_`
/// from the job name and turning spaces into underscores.
pub fn report_filename(job_name: &str, now: DateTime<Utc>) -> String {
    let kept: String = job_name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let mut safe_name = kept.trim().replace(' ', "_");
    if safe_name.is_empty() {
        safe_name = "price_report".to_string();
    }

    format!("{}_{}.xlsx", safe_name, now.format("%Y%m%d_%H%M%S"))
}

pub fn format_money(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("${:.2}", v),
        None => NOT_AVAILABLE.to_string(),
    }
}

pub fn format_percent(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}%", v),
        None => NOT_AVAILABLE.to_string(),
    }
}

fn text_or_na(value: Option<&str>) -> String {
    value.unwrap_or(NOT_AVAILABLE).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::ItemStatus;
    use serde_json::json;
    use uuid::Uuid;

    fn item(identifier: &str, payload: Option<serde_json::Value>) -> Item {
        Item {
            id: Uuid::new_v4(),
            batch_id: Uuid::new_v4(),
            position: 0,
            identifier: identifier.to_string(),
            status: ItemStatus::Completed,
            payload,
            error: None,
            processed_at: Some(Utc::now()),
        }
    }

    fn payload(product: serde_json::Value) -> serde_json::Value {
        json!({ "products": [product] })
    }

    #[test]
    fn test_zero_items_is_header_only() {
        let report = ReportCompiler::compile(&[], &HashMap::new(), Vec::new());
        let table = report.table();
        assert_eq!(table.len(), 1);
        assert_eq!(table[0][0], "Identifier");
        assert_eq!(table[0].len(), REPORT_HEADERS.len());
        assert_eq!(report.alert_table().len(), 1);

        let bytes = report.to_xlsx().unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn test_buy_box_from_stats() {
        let items = [item(
            "111111118",
            Some(payload(json!({
                "asin": "B000TEST01",
                "title": "Trail Runner 2",
                "brand": "Acme",
                "stats": {"buyBoxPrice": 80.0, "current": [-1, 85.0]},
                "buyBoxSellerId": "S1",
                "current_sellers": [
                    {"sellerId": "S1", "sellerName": "Acme Store", "price": 82.0},
                    {"sellerId": "S2", "sellerName": "Budget", "price": 70.0},
                ],
            }))),
        )];
        let prices = HashMap::from([("111111118".to_string(), 100.0)]);

        let report = ReportCompiler::compile(&items, &prices, Vec::new());
        let row = &report.rows[0];
        assert_eq!(row.buy_box_price, Some(80.0));
        assert_eq!(row.buy_box_seller.as_deref(), Some("Acme Store"));
        assert_eq!(row.current_price, Some(85.0));
        assert!(row.off_price);
        assert_eq!(report.off_price_count(), 1);

        let cells = row.cells();
        assert_eq!(cells[4], "Yes");
        assert_eq!(cells[5], "$100.00");
        assert_eq!(cells[7], "$20.00");
        assert_eq!(cells[8], "$80.00");
        assert_eq!(cells[10], "20.00%");
        assert_eq!(cells[11], "https://www.amazon.com/dp/B000TEST01");
    }

    #[test]
    fn test_buy_box_falls_back_to_matched_seller_then_lowest() {
        let matched = item(
            "a",
            Some(payload(json!({
                "buyBoxSellerId": "S1",
                "current_sellers": [
                    {"sellerId": "S1", "sellerName": "Acme Store", "price": 82.0},
                    {"sellerId": "S2", "sellerName": "Budget", "price": 70.0},
                ],
            }))),
        );
        let lowest = item(
            "b",
            Some(payload(json!({
                "current_sellers": [
                    {"sellerId": "S1", "sellerName": "Acme Store", "price": 82.0},
                    {"sellerId": "S2", "sellerName": "Budget", "price": 70.0},
                    {"sellerId": "S3", "sellerName": "Broken", "price": -1.0},
                ],
            }))),
        );

        let report = ReportCompiler::compile(&[matched, lowest], &HashMap::new(), Vec::new());
        assert_eq!(report.rows[0].buy_box_price, Some(82.0));
        assert_eq!(report.rows[0].buy_box_seller.as_deref(), Some("Acme Store"));
        assert_eq!(report.rows[1].buy_box_price, Some(70.0));
        assert_eq!(report.rows[1].buy_box_seller.as_deref(), Some("Budget"));
        assert_eq!(report.rows[1].current_price, Some(70.0));
    }

    #[test]
    fn test_missing_values_render_na_and_zero() {
        let items = [
            item("no-data", None),
            item("no-list", Some(payload(json!({"asin": "B1", "stats": {"buyBoxPrice": 5.0}})))),
        ];
        let report = ReportCompiler::compile(&items, &HashMap::new(), Vec::new());

        let empty = report.rows[0].cells();
        assert_eq!(empty[1], "N/A");
        assert_eq!(empty[4], "No");
        assert_eq!(empty[5], "N/A");
        assert_eq!(empty[7], "$0.00");
        assert_eq!(empty[10], "0.00%");

        let partial = report.rows[1].cells();
        assert_eq!(partial[5], "N/A");
        assert_eq!(partial[7], "$0.00");
        assert_eq!(partial[8], "$5.00");
        assert!(!report.rows[1].off_price);
    }

    #[test]
    fn test_alert_sheet_rows() {
        let alert = Alert {
            id: Uuid::new_v4(),
            job_id: Uuid::new_v4(),
            identifier: "111111118".to_string(),
            seller_name: "Cheap Co".to_string(),
            current_price: 7.0,
            historical_price: 10.0,
            price_change_percent: -30.0,
            payload: None,
            detected_at: Utc::now(),
        };
        let report = ReportCompiler::compile(&[], &HashMap::new(), vec![alert]);
        let table = report.alert_table();
        assert_eq!(table.len(), 2);
        assert_eq!(table[1][2], "$7.00");
        assert_eq!(table[1][3], "$10.00");
        assert_eq!(table[1][4], "-30.00%");
    }

    #[test]
    fn test_report_filename() {
        let now = DateTime::parse_from_rfc3339("2026-03-01T20:05:09Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            report_filename("Daily Price Report: 2026/03/01", now),
            "Daily_Price_Report_20260301_20260301_200509.xlsx"
        );
        assert_eq!(report_filename("***", now), "price_report_20260301_200509.xlsx");
    }
}
