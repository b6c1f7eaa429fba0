//! Report delivery.

use async_trait::async_trait;
use std::time::Duration;

pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// A compiled report on its way out.
#[derive(Debug, Clone)]
pub struct ReportDelivery {
    pub document: Vec<u8>,
    pub filename: String,
    pub job_name: String,
    pub total_processed: usize,
    pub alert_count: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Report delivery failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Report endpoint rejected delivery with HTTP {status}: {message}")]
    Rejected { status: u16, message: String },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_report(&self, delivery: ReportDelivery) -> Result<(), NotifyError>;
}

/// Posts the report as a multipart upload to a configured endpoint.
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_report(&self, delivery: ReportDelivery) -> Result<(), NotifyError> {
        let size = delivery.document.len();
        let form = reqwest::multipart::Form::new()
            .part(
                "report",
                reqwest::multipart::Part::bytes(delivery.document)
                    .file_name(delivery.filename.clone())
                    .mime_str(XLSX_MIME)?,
            )
            .text("job_name", delivery.job_name.clone())
            .text("total_processed", delivery.total_processed.to_string())
            .text("alert_count", delivery.alert_count.to_string());

        let response = self.http.post(&self.url).multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        tracing::info!(
            job_name = %delivery.job_name,
            filename = %delivery.filename,
            bytes = size,
            alerts = delivery.alert_count,
            "Report delivered"
        );
        Ok(())
    }
}

/// Fallback when no delivery endpoint is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_report(&self, delivery: ReportDelivery) -> Result<(), NotifyError> {
        tracing::info!(
            job_name = %delivery.job_name,
            filename = %delivery.filename,
            bytes = delivery.document.len(),
            total_processed = delivery.total_processed,
            alerts = delivery.alert_count,
            "No report endpoint configured, report not sent"
        );
        Ok(())
    }
}
