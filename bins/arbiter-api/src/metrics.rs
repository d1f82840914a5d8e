// Prometheus metrics for the Arbiter API
use anyhow::{Context, Result};
use arbiter_common::types::Verdict;
use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter_vec, Encoder, Histogram, IntCounterVec, TextEncoder,
};

lazy_static! {
    static ref EVALUATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "arbiter_evaluations_total",
        "Evaluations completed, by verdict",
        &["verdict"]
    )
    .expect("evaluations counter registers once");
    static ref CASES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "arbiter_cases_total",
        "Test cases judged, by status",
        &["status"]
    )
    .expect("cases counter registers once");
    static ref EVALUATION_SECONDS: Histogram = register_histogram!(
        "arbiter_evaluation_duration_seconds",
        "Wall-clock time of a whole evaluation",
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]
    )
    .expect("duration histogram registers once");
}

pub fn record(verdict: &Verdict) {
    let outcome = if verdict.passed { "passed" } else { "rejected" };
    EVALUATIONS_TOTAL.with_label_values(&[outcome]).inc();

    for result in &verdict.results {
        CASES_TOTAL
            .with_label_values(&[result.status.label()])
            .inc();
    }

    EVALUATION_SECONDS.observe(verdict.elapsed_ms as f64 / 1000.0);
}

/// Text exposition of every registered metric.
pub fn render() -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&prometheus::gather(), &mut buffer)
        .context("Failed to encode metrics")?;
    String::from_utf8(buffer).context("Metrics are not UTF-8")
}
