//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};

/// Serve `/metrics` on `port`. Must be called inside the tokio runtime.
pub fn init_metrics(port: u16) -> WorkerResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {}", e)))
}

/// Metric names as constants for consistency.
pub mod names {
    // Jobs
    pub const JOBS_STARTED_TOTAL: &str = "reel_jobs_started_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "reel_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "reel_jobs_failed_total";
    pub const JOBS_IN_FLIGHT: &str = "reel_jobs_in_flight";
    pub const STAGE_DURATION_SECONDS: &str = "reel_stage_duration_seconds";

    // Download
    pub const DOWNLOAD_ATTEMPTS_TOTAL: &str = "reel_download_attempts_total";
    pub const PROXY_FAILURES_TOTAL: &str = "reel_proxy_failures_total";

    // Segment extraction
    pub const ORACLE_ATTEMPTS_TOTAL: &str = "reel_oracle_attempts_total";
    pub const SEGMENTS_KEPT_TOTAL: &str = "reel_segments_kept_total";
    pub const SEGMENTS_DROPPED_TOTAL: &str = "reel_segments_dropped_total";

    // Output
    pub const CLIPS_RENDERED_TOTAL: &str = "reel_clips_rendered_total";
    pub const EFFECTS_SKIPPED_TOTAL: &str = "reel_effects_skipped_total";
}

pub fn record_job_started(project_type: &str) {
    let labels = [("project_type", project_type.to_string())];
    counter!(names::JOBS_STARTED_TOTAL, &labels).increment(1);
}

pub fn record_job_completed(project_type: &str) {
    let labels = [("project_type", project_type.to_string())];
    counter!(names::JOBS_COMPLETED_TOTAL, &labels).increment(1);
}

pub fn record_clip_rendered(orientation: &str) {
    let labels = [("orientation", orientation.to_string())];
    counter!(names::CLIPS_RENDERED_TOTAL, &labels).increment(1);
}

pub fn record_job_failed(kind: &str) {
    let labels = [("kind", kind.to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

pub fn set_jobs_in_flight(count: usize) {
    gauge!(names::JOBS_IN_FLIGHT).set(count as f64);
}

pub fn record_stage_duration(stage: &str, duration_secs: f64) {
    let labels = [("stage", stage.to_string())];
    histogram!(names::STAGE_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_download_attempt(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::DOWNLOAD_ATTEMPTS_TOTAL, &labels).increment(1);
}

pub fn record_proxy_failure(host: &str) {
    let labels = [("proxy", host.to_string())];
    counter!(names::PROXY_FAILURES_TOTAL, &labels).increment(1);
}

pub fn record_oracle_attempt(call: &str, outcome: &str) {
    let labels = [("call", call.to_string()), ("outcome", outcome.to_string())];
    counter!(names::ORACLE_ATTEMPTS_TOTAL, &labels).increment(1);
}

pub fn record_segments_kept(count: usize) {
    counter!(names::SEGMENTS_KEPT_TOTAL).increment(count as u64);
}

/// `reason` is `alignment_miss` or `overlap`.
pub fn record_segments_dropped(reason: &str, count: usize) {
    if count == 0 {
        return;
    }
    let labels = [("reason", reason.to_string())];
    counter!(names::SEGMENTS_DROPPED_TOTAL, &labels).increment(count as u64);
}

pub fn record_effect_skipped(effect: &str) {
    let labels = [("effect", effect.to_string())];
    counter!(names::EFFECTS_SKIPPED_TOTAL, &labels).increment(1);
}
