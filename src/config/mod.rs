use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Product data API key
    pub product_api_key: String,

    /// Product data API base URL
    #[serde(default = "default_product_api_url")]
    pub product_api_url: String,

    /// Marketplace domain id (1 = US)
    #[serde(default = "default_product_domain")]
    pub product_domain: u32,

    /// Statistics window requested from the API, in days
    #[serde(default = "default_stats_days")]
    pub product_stats_days: u32,

    /// HS256 secret used to verify bearer tokens
    pub jwt_secret: String,

    /// Where compiled reports are delivered. Reports are only logged when unset.
    #[serde(default)]
    pub notify_webhook_url: Option<String>,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_inter_batch_delay_ms")]
    pub inter_batch_delay_ms: u64,

    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// A processing job whose heartbeat is older than this is considered
    /// abandoned and may be taken over by another run.
    #[serde(default = "default_job_lease_secs")]
    pub job_lease_secs: u64,

    /// Look-back window for the historical reference price
    #[serde(default = "default_history_days")]
    pub history_days: i64,

    #[serde(default = "default_schedule_hour")]
    pub schedule_hour: u32,

    #[serde(default)]
    pub schedule_minute: u32,

    #[serde(default = "default_schedule_timezone")]
    pub schedule_timezone: String,

    /// Recorded as creator of jobs started by the daily trigger
    #[serde(default)]
    pub system_user_id: Option<String>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_product_api_url() -> String {
    "https://api.keepa.com".to_string()
}

fn default_product_domain() -> u32 {
    1
}

fn default_stats_days() -> u32 {
    180
}

fn default_batch_size() -> usize {
    119
}

fn default_inter_batch_delay_ms() -> u64 {
    1500
}

fn default_request_delay_ms() -> u64 {
    1000
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_max_retries() -> u32 {
    3
}

fn default_job_lease_secs() -> u64 {
    600
}

fn default_history_days() -> i64 {
    30
}

fn default_schedule_hour() -> u32 {
    20
}

fn default_schedule_timezone() -> String {
    "Asia/Taipei".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn processing(&self) -> ProcessingConfig {
        ProcessingConfig {
            batch_size: self.batch_size.max(1),
            inter_batch_delay: Duration::from_millis(self.inter_batch_delay_ms),
            history_days: self.history_days,
            job_lease: Duration::from_secs(self.job_lease_secs),
        }
    }

    pub fn client(&self) -> ClientConfig {
        ClientConfig {
            api_url: self.product_api_url.clone(),
            api_key: self.product_api_key.clone(),
            domain: self.product_domain,
            stats_days: self.product_stats_days,
            request_delay: Duration::from_millis(self.request_delay_ms),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            max_retries: self.max_retries,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn schedule(&self) -> ScheduleConfig {
        ScheduleConfig {
            hour: self.schedule_hour,
            minute: self.schedule_minute,
            timezone: self.schedule_timezone.clone(),
        }
    }
}

/// Knobs of the batch orchestrator.
#[derive(Debug, Clone)]
pub struct ProcessingConfig {
    pub batch_size: usize,
    pub inter_batch_delay: Duration,
    pub history_days: i64,
    /// How long a running job may go without a heartbeat before it can be reclaimed.
    pub job_lease: Duration,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            inter_batch_delay: Duration::from_millis(default_inter_batch_delay_ms()),
            history_days: default_history_days(),
            job_lease: Duration::from_secs(default_job_lease_secs()),
        }
    }
}

/// Connection and throttling settings for the product data API.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub api_key: String,
    pub domain: u32,
    pub stats_days: u32,
    /// Slept before every request.
    pub request_delay: Duration,
    /// Base of the exponential backoff: `retry_delay * 2^attempt`.
    pub retry_delay: Duration,
    pub max_retries: u32,
    pub timeout: Duration,
}

/// When the daily trigger fires. Replaced wholesale on reconfiguration.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ScheduleConfig {
    pub hour: u32,
    pub minute: u32,
    pub timezone: String,
}

impl ScheduleConfig {
    /// Six-field cron expression (seconds first) for the configured time of day.
    pub fn cron_expression(&self) -> String {
        format!("0 {} {} * * *", self.minute, self.hour)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cron_expression() {
        let schedule = ScheduleConfig {
            hour: 20,
            minute: 5,
            timezone: "Asia/Taipei".to_string(),
        };
        assert_eq!(schedule.cron_expression(), "0 5 20 * * *");
    }

    #[test]
    fn test_processing_defaults() {
        let config = ProcessingConfig::default();
        assert_eq!(config.batch_size, 119);
        assert_eq!(config.inter_batch_delay, Duration::from_millis(1500));
        assert_eq!(config.history_days, 30);
        assert_eq!(config.job_lease, Duration::from_secs(600));
    }
}
