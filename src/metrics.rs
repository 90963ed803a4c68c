//! Run metrics.
//!
//! Counters and histograms go through the `metrics` facade. A Prometheus recorder is
//! installed without an HTTP listener; after a run its rendered snapshot can be
//! pushed to a Pushgateway.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{info, warn};

/// Install the Prometheus recorder. Returns `None` if a recorder is already installed.
pub fn init_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Prometheus recorder install failed (possibly already installed): {}", e);
            None
        }
    }
}

pub mod sources {
    pub fn request_success(duration_secs: f64, payload_bytes: usize) {
        ::metrics::counter!("ppsf_source_requests_success_total").increment(1);
        ::metrics::histogram!("ppsf_source_request_duration_seconds").record(duration_secs);
        ::metrics::histogram!("ppsf_source_payload_bytes").record(payload_bytes as f64);
    }

    pub fn request_error() {
        ::metrics::counter!("ppsf_source_requests_error_total").increment(1);
    }
}

pub mod stages {
    pub fn rows_fetched(rows: usize) {
        ::metrics::counter!("ppsf_rows_fetched_total").increment(rows as u64);
    }

    pub fn rows_out(stage: &'static str, rows: usize) {
        ::metrics::gauge!("ppsf_stage_rows", "stage" => stage).set(rows as f64);
    }

    pub fn rows_dropped(stage: &'static str, reason: &'static str, rows: usize) {
        if rows > 0 {
            ::metrics::counter!("ppsf_rows_dropped_total", "stage" => stage, "reason" => reason)
                .increment(rows as u64);
        }
    }

    pub fn duration(stage: &'static str, secs: f64) {
        ::metrics::histogram!("ppsf_stage_duration_seconds", "stage" => stage).record(secs);
    }
}

/// Push the rendered snapshot to `{base}/metrics/job/ppsf_trends/instance/{instance}`.
/// Failures only warn; a run never fails because of metrics.
pub async fn push_to_gateway(handle: &PrometheusHandle, base: &str, instance: &str) {
    let push_url = format!(
        "{}/metrics/job/{}/instance/{}",
        base.trim_end_matches('/'),
        "ppsf_trends",
        instance
    );
    let timestamp_secs = chrono::Utc::now().timestamp() as f64;
    let body = format!(
        "{}# TYPE ppsf_last_run_timestamp_seconds gauge\nppsf_last_run_timestamp_seconds {}\n",
        handle.render(),
        timestamp_secs
    );

    let client = reqwest::Client::new();
    let push_res = client
        .post(&push_url)
        .header("Content-Type", "text/plain; version=0.0.4")
        .body(body)
        .send()
        .await;

    match push_res {
        Ok(r) if r.status().is_success() => {
            info!("Pushed metrics to Pushgateway for instance={}", instance);
        }
        Ok(r) => {
            warn!(
                "Pushgateway push responded with status {} for instance={}",
                r.status().as_u16(),
                instance
            );
        }
        Err(e) => {
            warn!("Failed to push metrics to Pushgateway for instance={}: {}", instance, e);
        }
    }
}
