//! Test doubles and wiring shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use price_watch::app_state::AppState;
use price_watch::config::ProcessingConfig;
use price_watch::db::memory::MemoryJobStore;
use price_watch::routes;
use price_watch::services::identity::IdentityService;
use price_watch::services::notifier::{Notifier, NotifyError, ReportDelivery};
use price_watch::services::orchestrator::Orchestrator;
use price_watch::services::product_client::{ProductApiError, ProductSource};

pub const TEST_SECRET: &str = "integration-test-secret";

/// Serves canned payloads; unknown identifiers resolve to "no product".
#[derive(Default)]
pub struct StubSource {
    payloads: HashMap<String, Value>,
    failures: HashMap<String, u16>,
    calls: Mutex<Vec<String>>,
}

impl StubSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_payload(mut self, identifier: &str, payload: Value) -> Self {
        self.payloads.insert(identifier.to_string(), payload);
        self
    }

    pub fn with_failure(mut self, identifier: &str, status: u16) -> Self {
        self.failures.insert(identifier.to_string(), status);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ProductSource for StubSource {
    async fn fetch(&self, identifier: &str) -> Result<Option<Value>, ProductApiError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(identifier.to_string());

        if let Some(status) = self.failures.get(identifier) {
            return Err(ProductApiError::Api {
                status: *status,
                message: "stubbed failure".to_string(),
            });
        }
        Ok(self.payloads.get(identifier).cloned())
    }
}

/// Keeps every delivery; optionally fails them all.
#[derive(Default)]
pub struct RecordingNotifier {
    deliveries: Mutex<Vec<ReportDelivery>>,
    reject: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting() -> Self {
        Self {
            deliveries: Mutex::new(Vec::new()),
            reject: true,
        }
    }

    pub fn deliveries(&self) -> Vec<ReportDelivery> {
        self.deliveries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_report(&self, delivery: ReportDelivery) -> Result<(), NotifyError> {
        self.deliveries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(delivery);

        if self.reject {
            return Err(NotifyError::Rejected {
                status: 503,
                message: "mailbox unavailable".to_string(),
            });
        }
        Ok(())
    }
}

pub fn processing(batch_size: usize) -> ProcessingConfig {
    ProcessingConfig {
        batch_size,
        inter_batch_delay: Duration::ZERO,
        history_days: 30,
        job_lease: Duration::from_secs(600),
    }
}

pub fn orchestrator(
    store: Arc<MemoryJobStore>,
    source: Arc<dyn ProductSource>,
    notifier: Arc<dyn Notifier>,
    batch_size: usize,
) -> Orchestrator {
    Orchestrator::new(store, source, notifier, processing(batch_size))
}

pub fn codes(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Serves the application router on an ephemeral port. Returns its base URL.
pub async fn spawn_app(orchestrator: Orchestrator) -> String {
    let state = AppState::new(orchestrator, IdentityService::new(TEST_SECRET));
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Listener has no address");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Test server error");
    });

    format!("http://{}", addr)
}

pub fn bearer(user_id: &str) -> String {
    let token = IdentityService::new(TEST_SECRET)
        .issue(user_id, 3600)
        .expect("Failed to issue test token");
    format!("Bearer {}", token)
}

/// Polls until `check` holds or the timeout expires.
pub async fn wait_for<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
