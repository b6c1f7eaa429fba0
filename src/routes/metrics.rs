use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Registers descriptions for every metric the pipeline emits.
pub fn describe() {
    metrics::describe_counter!(
        "price_watch_items_total",
        "Identifiers processed, labelled by outcome"
    );
    metrics::describe_counter!("price_watch_alerts_total", "Off-price sellers detected");
    metrics::describe_counter!("price_watch_batches_total", "Batches finished, labelled by outcome");
    metrics::describe_histogram!("price_watch_batch_seconds", "Time to process one batch");
    metrics::describe_counter!("price_watch_jobs_total", "Job runs finished, labelled by outcome");
    metrics::describe_counter!("product_api_retries_total", "Retried product API requests");
}

/// GET /metrics: Prometheus text exposition format.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}
