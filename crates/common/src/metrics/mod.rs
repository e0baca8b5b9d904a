//! Metrics and observability utilities
//!
//! Provides metric descriptions and helpers with standardized naming
//! conventions. The Prometheus recorder itself is installed by the gateway.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all StudyForge metrics
pub const METRICS_PREFIX: &str = "studyforge";

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_questions_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of questions answered"
    );

    describe_counter!(
        format!("{}_summaries_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of summaries generated"
    );

    describe_counter!(
        format!("{}_exams_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of exams generated"
    );

    describe_counter!(
        format!("{}_ingest_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of material ingestions started"
    );

    describe_counter!(
        format!("{}_ingest_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of failed material ingestions"
    );

    describe_counter!(
        format!("{}_llm_calls_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of LLM chat calls"
    );

    describe_histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Similarity search latency in seconds"
    );

    describe_histogram!(
        format!("{}_generation_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end generation latency in seconds"
    );
}

/// Increment a counter under the StudyForge prefix
pub fn increment(name: &str) {
    counter!(format!("{}_{}", METRICS_PREFIX, name)).increment(1);
}

/// Timer that records a histogram on drop
pub struct Timer {
    name: String,
    start: Instant,
}

impl Timer {
    pub fn start(name: &str) -> Self {
        Self {
            name: format!("{}_{}", METRICS_PREFIX, name),
            start: Instant::now(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        histogram!(self.name.clone()).record(self.start.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_records_without_recorder() {
        // Without an installed recorder this is a no-op and must not panic
        let timer = Timer::start("retrieval_duration_seconds");
        drop(timer);
        increment("questions_total");
    }
}
