use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Succeeded,
    Failed,
}

/// Synthetic metric bracketing one component execution attempt.
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeMetric {
    pub outcome: Outcome,
    pub component: String,
    pub scenario: Option<String>,
    pub agent_id: String,
    pub experiment_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl OutcomeMetric {
    pub fn name(&self) -> &'static str {
        match self.outcome {
            Outcome::Succeeded => "Succeeded",
            Outcome::Failed => "Failed",
        }
    }

    pub fn value(&self) -> f64 {
        1.0
    }
}

pub trait MetricSink: Send + Sync {
    fn record(&self, metric: &OutcomeMetric);
}

/// Writes metrics to the `metrics` log target.
pub struct LogMetricSink;

impl MetricSink for LogMetricSink {
    fn record(&self, metric: &OutcomeMetric) {
        match serde_json::to_string(metric) {
            Ok(json) => log::info!(target: "metrics", "{} {}", metric.name(), json),
            Err(e) => log::warn!("Failed to serialize outcome metric: {}", e),
        }
    }
}

#[derive(Default)]
pub struct MemoryMetricSink {
    metrics: Mutex<Vec<OutcomeMetric>>,
}

impl MemoryMetricSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics(&self) -> Vec<OutcomeMetric> {
        self.metrics.lock().clone()
    }
}

impl MetricSink for MemoryMetricSink {
    fn record(&self, metric: &OutcomeMetric) {
        self.metrics.lock().push(metric.clone());
    }
}
