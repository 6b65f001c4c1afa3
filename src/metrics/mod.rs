//! Prometheus metrics for the coordinator and probe workers
//!
//! This module provides metrics tracking for:
//! - Coordinator: sweeps, published check requests, correlated responses
//! - Workers: probes by classification, probe latency, dropped requests
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, or is never attempted, every recording function
//! is a no-op.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram_vec, Counter,
    CounterVec, Encoder, Gauge, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

use crate::models::InstanceStatus;
use crate::store::UpdateOutcome;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all coordinator metrics
struct CoordinatorMetrics {
    sweeps: Counter,
    sweep_failures: Counter,
    instances_known: Gauge,
    requests_published: Counter,
    publish_errors: CounterVec,
    responses: CounterVec,
}

/// Container for all worker metrics
struct WorkerMetrics {
    probes: CounterVec,
    probe_duration: HistogramVec,
    decode_errors: CounterVec,
}

/// Both metric groups, registered together
struct Metrics {
    coordinator: CoordinatorMetrics,
    worker: WorkerMetrics,
}

/// Outcome of the one registration attempt
static METRICS: OnceLock<Result<Metrics, String>> = OnceLock::new();

fn metrics() -> Option<&'static Metrics> {
    METRICS.get().and_then(|m| m.as_ref().ok())
}

fn coordinator_metrics() -> Option<&'static CoordinatorMetrics> {
    metrics().map(|m| &m.coordinator)
}

fn worker_metrics() -> Option<&'static WorkerMetrics> {
    metrics().map(|m| &m.worker)
}

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Registration runs once. Concurrent and later callers wait for that
/// attempt and get its result.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    match METRICS.get_or_init(|| register_metrics().map_err(|e| e.to_string())) {
        Ok(_) => Ok(()),
        Err(reason) => Err(reason.clone().into()),
    }
}

fn register_metrics() -> Result<Metrics, prometheus::Error> {
    let coordinator = CoordinatorMetrics {
        sweeps: register_counter!(
            "activity_status_sweeps_total",
            "Total number of sweeps started"
        )?,
        sweep_failures: register_counter!(
            "activity_status_sweep_failures_total",
            "Sweeps aborted because instances could not be read"
        )?,
        instances_known: register_gauge!(
            "activity_status_instances_known",
            "Instances read by the most recent sweep"
        )?,
        requests_published: register_counter!(
            "activity_status_requests_published_total",
            "Check requests published to the bus"
        )?,
        publish_errors: register_counter_vec!(
            "activity_status_publish_errors_total",
            "Failed publishes by subject",
            &["subject"]
        )?,
        responses: register_counter_vec!(
            "activity_status_responses_total",
            "Check responses handled by the coordinator, by outcome",
            &["outcome"]
        )?,
    };

    let worker = WorkerMetrics {
        probes: register_counter_vec!(
            "activity_status_probes_total",
            "Probes performed, by classified status",
            &["status"]
        )?,
        probe_duration: register_histogram_vec!(
            "activity_status_probe_duration_seconds",
            "Probe duration in seconds",
            &["status"],
            vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
        )?,
        decode_errors: register_counter_vec!(
            "activity_status_decode_errors_total",
            "Messages dropped because they could not be decoded, by subject",
            &["subject"]
        )?,
    };

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(Metrics {
        coordinator,
        worker,
    })
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    metrics().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record the start of a sweep
pub fn record_sweep_started() {
    if let Some(m) = coordinator_metrics() {
        m.sweeps.inc();
    }
}

/// Record a sweep aborted before fan-out
pub fn record_sweep_failed() {
    if let Some(m) = coordinator_metrics() {
        m.sweep_failures.inc();
    }
}

/// Record fan-out results of one sweep
pub fn record_dispatch(instances: usize, published: usize) {
    let Some(m) = coordinator_metrics() else {
        return;
    };

    m.instances_known.set(instances as f64);
    m.requests_published.inc_by(published as f64);
}

/// Record a failed publish
pub fn record_publish_error(subject: &str) {
    if let Some(m) = coordinator_metrics() {
        m.publish_errors.with_label_values(&[subject]).inc();
    }
}

/// Record a correlated response that reached the store
pub fn record_update_outcome(outcome: UpdateOutcome) {
    let label = match outcome {
        UpdateOutcome::Updated => "updated",
        UpdateOutcome::NotFound => "not_found",
    };
    record_response(label);
}

/// Record a response by outcome label
pub fn record_response(outcome: &str) {
    if let Some(m) = coordinator_metrics() {
        m.responses.with_label_values(&[outcome]).inc();
    }
}

/// Record one probe and how long it took
pub fn record_probe(status: InstanceStatus, duration_secs: f64) {
    let Some(m) = worker_metrics() else {
        return;
    };

    m.probes.with_label_values(&[status.as_str()]).inc();
    m.probe_duration
        .with_label_values(&[status.as_str()])
        .observe(duration_secs);
}

/// Record a message dropped at decode
pub fn record_decode_error(subject: &str) {
    if let Some(m) = worker_metrics() {
        m.decode_errors.with_label_values(&[subject]).inc();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ensure_metrics_initialized() {
        let _ = init_metrics();
    }

    #[test]
    fn test_init_metrics_is_idempotent() {
        assert!(init_metrics().is_ok());
        assert!(init_metrics().is_ok());
    }

    #[test]
    fn test_concurrent_init_sees_registered_metrics() {
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    assert!(init_metrics().is_ok());
                    assert!(metrics_initialized());
                });
            }
        });
    }

    #[test]
    fn test_metrics_initialized() {
        ensure_metrics_initialized();
        assert!(metrics_initialized());
    }

    #[test]
    fn test_encode_metrics() {
        ensure_metrics_initialized();
        record_sweep_started();
        let text = encode_metrics().unwrap();
        assert!(text.contains("activity_status_sweeps_total"));
    }

    #[test]
    fn test_recording_does_not_panic() {
        ensure_metrics_initialized();
        record_sweep_failed();
        record_dispatch(3, 2);
        record_publish_error("activity-status.request");
        record_update_outcome(UpdateOutcome::Updated);
        record_update_outcome(UpdateOutcome::NotFound);
        record_response("decode_error");
        record_probe(InstanceStatus::Errored, 0.02);
        record_decode_error("activity-status.response");
    }
}
