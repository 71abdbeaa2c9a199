use std::collections::VecDeque;

use serde::Serialize;

use crate::utils::now_epoch_ms;

const DEFAULT_WINDOW_SIZE: usize = 256;
const DISPATCH_P95_TARGET_MS: u64 = 500;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSummary {
    pub samples: usize,
    pub average_ms: u64,
    pub p95_ms: u64,
    pub max_ms: u64,
}

impl MetricSummary {
    fn empty() -> Self {
        Self {
            samples: 0,
            average_ms: 0,
            p95_ms: 0,
            max_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub generated_at_ms: u64,
    pub dispatch: MetricSummary,
    pub diff: MetricSummary,
    pub dispatched_commands: u64,
    pub dropped_messages: u64,
    pub unknown_commands: u64,
    pub failed_sends: u64,
    pub warnings: Vec<String>,
}

#[derive(Debug)]
struct RollingMetric {
    values: VecDeque<u64>,
    capacity: usize,
}

impl RollingMetric {
    fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn record(&mut self, value_ms: u64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value_ms);
    }

    fn summary(&self) -> MetricSummary {
        if self.values.is_empty() {
            return MetricSummary::empty();
        }

        let samples = self.values.len();
        let sum: u64 = self.values.iter().sum();
        let average_ms = sum / samples as u64;
        let max_ms = *self.values.iter().max().unwrap_or(&0);

        let mut sorted = self.values.iter().copied().collect::<Vec<_>>();
        sorted.sort_unstable();
        let p95_index = ((samples as f64 * 0.95).ceil() as usize)
            .saturating_sub(1)
            .min(samples - 1);
        let p95_ms = sorted[p95_index];

        MetricSummary {
            samples,
            average_ms,
            p95_ms,
            max_ms,
        }
    }
}

/// Latency windows and counters for the command pipeline.
#[derive(Debug)]
pub struct RuntimeMetrics {
    dispatch_ms: RollingMetric,
    diff_ms: RollingMetric,
    dispatched_commands: u64,
    dropped_messages: u64,
    unknown_commands: u64,
    failed_sends: u64,
}

impl RuntimeMetrics {
    pub fn new() -> Self {
        Self {
            dispatch_ms: RollingMetric::new(DEFAULT_WINDOW_SIZE),
            diff_ms: RollingMetric::new(DEFAULT_WINDOW_SIZE),
            dispatched_commands: 0,
            dropped_messages: 0,
            unknown_commands: 0,
            failed_sends: 0,
        }
    }

    pub fn record_dispatch(&mut self, dispatch_ms: u64) {
        self.dispatch_ms.record(dispatch_ms);
        self.dispatched_commands += 1;
    }

    pub fn record_diff(&mut self, diff_ms: u64) {
        self.diff_ms.record(diff_ms);
    }

    pub fn record_dropped_message(&mut self) {
        self.dropped_messages += 1;
    }

    pub fn record_unknown_command(&mut self) {
        self.unknown_commands += 1;
    }

    pub fn record_failed_send(&mut self) {
        self.failed_sends += 1;
    }

    pub fn report(&self) -> PerformanceReport {
        let dispatch = self.dispatch_ms.summary();
        let diff = self.diff_ms.summary();

        let mut warnings = Vec::new();
        if self.dropped_messages > 0 {
            warnings.push(format!(
                "Dropped {} malformed IPC messages.",
                self.dropped_messages
            ));
        }
        if self.unknown_commands > 0 {
            warnings.push(format!(
                "Ignored {} commands with no registered handler.",
                self.unknown_commands
            ));
        }
        if self.failed_sends > 0 {
            warnings.push(format!(
                "Failed to deliver {} outbound messages.",
                self.failed_sends
            ));
        }
        if dispatch.samples > 0 && dispatch.p95_ms > DISPATCH_P95_TARGET_MS {
            warnings.push(format!(
                "Dispatch P95 latency {}ms exceeded target {}ms.",
                dispatch.p95_ms, DISPATCH_P95_TARGET_MS
            ));
        }

        PerformanceReport {
            generated_at_ms: now_epoch_ms(),
            dispatch,
            diff,
            dispatched_commands: self.dispatched_commands,
            dropped_messages: self.dropped_messages,
            unknown_commands: self.unknown_commands,
            failed_sends: self.failed_sends,
            warnings,
        }
    }
}

impl Default for RuntimeMetrics {
    fn default() -> Self {
        Self::new()
    }
}
