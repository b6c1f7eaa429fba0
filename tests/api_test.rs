//! HTTP API tests against an in-process server
//!
//! The router runs on an ephemeral port with the in-memory store and stub
//! product source, so no external infrastructure is needed.
//!
//! Run with: cargo test --test api_test

mod fixtures;
mod helpers;

use fixtures::*;
use helpers::*;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use price_watch::db::memory::MemoryJobStore;
use price_watch::db::JobStore;

async fn app() -> (String, Arc<MemoryJobStore>) {
    let store = Arc::new(MemoryJobStore::new());
    let source = Arc::new(StubSource::new().with_payload(OFF_PRICE_CODE, off_price_payload()));
    let orchestrator = orchestrator(store.clone(), source, Arc::new(RecordingNotifier::new()), 1);
    (spawn_app(orchestrator).await, store)
}

#[tokio::test]
async fn test_health_check() {
    let (base_url, store) = app().await;
    let client = reqwest::Client::new();

    let response = client.get(format!("{}/health", base_url)).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["checks"]["database"]["status"], "ok");
    assert_eq!(body["checks"]["scheduler"]["status"], "disabled");

    store.set_unavailable(true);
    let response = client.get(format!("{}/health", base_url)).send().await.unwrap();
    assert_eq!(response.status(), 503);
}

#[tokio::test]
async fn test_requests_without_token_are_rejected() {
    let (base_url, _) = app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/v1/jobs", base_url))
        .json(&json!({"name": "Nightly Run", "identifiers": [OFF_PRICE_CODE]}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "UNAUTHORIZED");

    let response = client
        .get(format!("{}/api/v1/jobs", base_url))
        .header("Authorization", "Bearer not-a-token")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_empty_identifier_list_is_rejected() {
    let (base_url, store) = app().await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/jobs", base_url))
        .header("Authorization", bearer("user-1"))
        .json(&json!({"name": "Nothing", "identifiers": []}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 422);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(store.job_count(), 0);
}

#[tokio::test]
async fn test_job_lifecycle_over_http() {
    let (base_url, store) = app().await;
    let client = reqwest::Client::new();
    let auth = bearer("user-1");

    let response = client
        .post(format!("{}/api/v1/jobs", base_url))
        .header("Authorization", &auth)
        .json(&json!({"name": "Nightly Run", "identifiers": [OFF_PRICE_CODE, UNKNOWN_CODE]}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);
    let job: Value = response.json().await.unwrap();
    assert_eq!(job["created_by"], "user-1");
    assert_eq!(job["total_batches"], 2);
    let job_id = job["id"].as_str().unwrap().to_string();

    let finished = wait_for(Duration::from_secs(5), || {
        let client = client.clone();
        let url = format!("{}/api/v1/jobs/{}/status", base_url, job_id);
        let auth = auth.clone();
        async move {
            let status: Value = client
                .get(url)
                .header("Authorization", auth)
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            status["status"] == "completed"
        }
    })
    .await;
    assert!(finished, "job did not complete in time");

    let status: Value = client
        .get(format!("{}/api/v1/jobs/{}/status", base_url, job_id))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["progress_percent"], 100.0);
    assert_eq!(status["batches"].as_array().unwrap().len(), 2);

    let alerts: Value = client
        .get(format!("{}/api/v1/reports/{}", base_url, job_id))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(alerts.as_array().unwrap().len(), 1);
    assert_eq!(alerts[0]["identifier"], OFF_PRICE_CODE);

    let response = client
        .get(format!("{}/api/v1/reports/{}/xlsx", base_url, job_id))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"],
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    );
    let disposition = response.headers()["content-disposition"].to_str().unwrap().to_string();
    assert!(disposition.contains("Nightly_Run_"));
    let document = response.bytes().await.unwrap();
    assert!(document.starts_with(b"PK"));

    let response = client
        .post(format!("{}/api/v1/jobs/{}/trigger", base_url, job_id))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);

    let batch_id = status["batches"][0]["id"].as_str().unwrap().to_string();
    let response = client
        .post(format!("{}/api/v1/batches/{}/stop", base_url, batch_id))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);

    let items: Value = client
        .get(format!("{}/api/v1/batches/{}/items", base_url, batch_id))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(items[0]["identifier"], OFF_PRICE_CODE);
    assert_eq!(items[0]["status"], "completed");

    assert_eq!(store.job_count(), 1);
}

#[tokio::test]
async fn test_stop_pending_batch() {
    let (base_url, store) = app().await;
    let job = store
        .create_job(price_watch::models::job::NewJob {
            name: "Queued".to_string(),
            created_by: None,
            batches: vec![codes(&["a"])],
        })
        .await
        .unwrap();
    let batch_id = store.list_batches(job.id).await.unwrap()[0].id;

    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/batches/{}/stop", base_url, batch_id))
        .header("Authorization", bearer("user-1"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let batch: Value = response.json().await.unwrap();
    assert_eq!(batch["status"], "cancelled");
    assert_eq!(batch["error"], "Cancelled by user");
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let (base_url, _) = app().await;

    let response = reqwest::Client::new()
        .get(format!("{}/api/v1/jobs/{}", base_url, uuid::Uuid::new_v4()))
        .header("Authorization", bearer("user-1"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_watchlist_and_list_prices_import() {
    let (base_url, store) = app().await;
    let client = reqwest::Client::new();
    let auth = bearer("user-1");

    let body: Value = client
        .post(format!("{}/api/v1/watchlist", base_url))
        .header("Authorization", &auth)
        .json(&json!({"identifiers": ["111", "222", "111"]}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["received"], 3);
    assert_eq!(body["stored"], 2);
    assert_eq!(store.watchlist().await.unwrap(), vec!["111", "222"]);

    let body: Value = client
        .put(format!("{}/api/v1/list-prices", base_url))
        .header("Authorization", &auth)
        .json(&json!({"entries": [
            {"identifier": "111", "list_price": 19.99},
            {"identifier": "111", "list_price": 24.99},
        ]}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["stored"], 1);

    let prices = store.list_prices(&codes(&["111"])).await.unwrap();
    assert_eq!(prices.get("111"), Some(&24.99));

    let response = client
        .put(format!("{}/api/v1/list-prices", base_url))
        .header("Authorization", &auth)
        .json(&json!({"entries": [{"identifier": "111", "list_price": -1.0}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 422);
}

#[tokio::test]
async fn test_schedule_requires_running_trigger() {
    let (base_url, _) = app().await;

    let response = reqwest::Client::new()
        .get(format!("{}/api/v1/schedule", base_url))
        .header("Authorization", bearer("user-1"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 503);
}

#[tokio::test]
async fn test_watchlist_management() {
    let (base_url, store) = app().await;
    let client = reqwest::Client::new();
    let auth = bearer("user-1");
    store
        .add_to_watchlist(&codes(&["111", "222", "333"]))
        .await
        .unwrap();

    let entries: Value = client
        .get(format!("{}/api/v1/watchlist?limit=2&offset=1", base_url))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let listed: Vec<&str> = entries
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["identifier"].as_str().unwrap())
        .collect();
    assert_eq!(listed, vec!["222", "333"]);

    let count: Value = client
        .get(format!("{}/api/v1/watchlist/count", base_url))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(count["count"], 3);

    let response = client
        .delete(format!("{}/api/v1/watchlist/222", base_url))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(store.watchlist().await.unwrap(), vec!["111", "333"]);

    let response = client
        .delete(format!("{}/api/v1/watchlist/222", base_url))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let cleared: Value = client
        .delete(format!("{}/api/v1/watchlist", base_url))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cleared["deleted"], 2);
    assert_eq!(store.count_watchlist().await.unwrap(), 0);
}

#[tokio::test]
async fn test_list_price_management() {
    let (base_url, store) = app().await;
    let client = reqwest::Client::new();
    let auth = bearer("user-1");
    store
        .upsert_list_prices(&[
            ("B00ABC".to_string(), 19.99),
            ("B00XYZ".to_string(), 5.0),
            ("C00ABC".to_string(), 7.25),
        ])
        .await
        .unwrap();

    let found: Value = client
        .get(format!("{}/api/v1/list-prices?search=abc", base_url))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let identifiers: Vec<&str> = found
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["identifier"].as_str().unwrap())
        .collect();
    assert_eq!(identifiers, vec!["B00ABC", "C00ABC"]);

    let count: Value = client
        .get(format!("{}/api/v1/list-prices/count?search=abc", base_url))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(count["count"], 2);

    let entry: Value = client
        .get(format!("{}/api/v1/list-prices/B00XYZ", base_url))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(entry["list_price"], 5.0);

    let response = client
        .delete(format!("{}/api/v1/list-prices/B00XYZ", base_url))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = client
        .get(format!("{}/api/v1/list-prices/B00XYZ", base_url))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let cleared: Value = client
        .delete(format!("{}/api/v1/list-prices", base_url))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cleared["deleted"], 2);
    assert_eq!(store.count_list_prices(None).await.unwrap(), 0);
}
