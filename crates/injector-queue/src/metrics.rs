//! Queue metrics and health
//!
//! Trailing-window error rate over terminal outcomes plus lifetime counters.
//! Health is derived from the error rate and the queue depth on each query.

use crate::types::{Task, TaskStatus};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// Overall health summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemHealth {
    Healthy,
    Degraded,
    Critical,
}

impl fmt::Display for SystemHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SystemHealth::Healthy => "healthy",
            SystemHealth::Degraded => "degraded",
            SystemHealth::Critical => "critical",
        })
    }
}

/// Health classification thresholds (inclusive)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthThresholds {
    pub degraded_error_rate: f64,
    pub critical_error_rate: f64,
    pub degraded_queue_depth: usize,
    pub critical_queue_depth: usize,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            degraded_error_rate: 0.05,
            critical_error_rate: 0.15,
            degraded_queue_depth: 100,
            critical_queue_depth: 1000,
        }
    }
}

impl HealthThresholds {
    /// Classify an error rate and queue depth
    #[must_use]
    pub fn classify(&self, error_rate: f64, queue_depth: usize) -> SystemHealth {
        if error_rate >= self.critical_error_rate || queue_depth >= self.critical_queue_depth {
            SystemHealth::Critical
        } else if error_rate >= self.degraded_error_rate
            || queue_depth >= self.degraded_queue_depth
        {
            SystemHealth::Degraded
        } else {
            SystemHealth::Healthy
        }
    }

    fn validate(&self) -> Result<(), String> {
        let rates = [self.degraded_error_rate, self.critical_error_rate];
        if rates.iter().any(|r| !(0.0..=1.0).contains(r)) {
            return Err("error rate thresholds must be within [0, 1]".into());
        }
        if self.degraded_error_rate > self.critical_error_rate {
            return Err("degraded_error_rate exceeds critical_error_rate".into());
        }
        if self.degraded_queue_depth > self.critical_queue_depth {
            return Err("degraded_queue_depth exceeds critical_queue_depth".into());
        }
        Ok(())
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsConfig {
    /// Terminal outcomes considered by the error rate
    pub window_size: usize,
    pub thresholds: HealthThresholds,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            window_size: 100,
            thresholds: HealthThresholds::default(),
        }
    }
}

impl MetricsConfig {
    /// Check internal consistency
    ///
    /// # Errors
    /// Returns a description of the first problem found
    pub fn validate(&self) -> Result<(), String> {
        if self.window_size == 0 {
            return Err("metrics.window_size must be at least 1".into());
        }
        self.thresholds.validate()
    }
}

/// Point-in-time queue metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMetrics {
    pub queue_depth: usize,
    pub running: usize,
    pub error_rate: f64,
    pub system_health: SystemHealth,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub average_completion_ms: f64,
    pub window_size: usize,
}

#[derive(Debug, Default)]
struct Counters {
    /// `true` for a failure, newest last
    window: VecDeque<bool>,
    completed: u64,
    failed: u64,
    total_completion_ms: u128,
}

/// Records terminal outcomes
#[derive(Debug)]
pub struct MetricsRecorder {
    config: MetricsConfig,
    counters: Mutex<Counters>,
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new(MetricsConfig::default())
    }
}

impl MetricsRecorder {
    /// Create recorder
    #[must_use]
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            config,
            counters: Mutex::new(Counters {
                window: VecDeque::with_capacity(config.window_size),
                ..Counters::default()
            }),
        }
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Record a successful task and its run time
    pub fn record_success(&self, duration: Duration) {
        let mut counters = self.counters.lock();
        counters.completed += 1;
        counters.total_completion_ms += duration.as_millis();
        self.push(&mut counters, false);
    }

    /// Record a task that finished failed
    pub fn record_failure(&self) {
        let mut counters = self.counters.lock();
        counters.failed += 1;
        self.push(&mut counters, true);
    }

    fn push(&self, counters: &mut Counters, failed: bool) {
        if counters.window.len() == self.config.window_size.max(1) {
            counters.window.pop_front();
        }
        counters.window.push_back(failed);
    }

    /// Failed / completed over the trailing window; `0.0` when empty
    #[must_use]
    pub fn error_rate(&self) -> f64 {
        let counters = self.counters.lock();
        Self::rate(&counters)
    }

    #[allow(clippy::cast_precision_loss)]
    fn rate(counters: &Counters) -> f64 {
        if counters.window.is_empty() {
            return 0.0;
        }
        let failures = counters.window.iter().filter(|&&failed| failed).count();
        failures as f64 / counters.window.len() as f64
    }

    /// Rebuild counters from finished tasks, in completion order
    pub fn replay<'a>(&self, tasks: impl IntoIterator<Item = &'a Task>) {
        let mut finished: Vec<&Task> = tasks
            .into_iter()
            .filter(|t| t.status.is_terminal())
            .collect();
        finished.sort_by_key(|t| t.completed_at);

        *self.counters.lock() = Counters::default();
        for task in finished {
            if task.status == TaskStatus::Succeeded {
                let elapsed = match (task.started_at, task.completed_at) {
                    (Some(start), Some(end)) => (end - start).to_std().unwrap_or_default(),
                    _ => Duration::ZERO,
                };
                self.record_success(elapsed);
            } else {
                self.record_failure();
            }
        }
    }

    /// Current metrics for the given queue depth and running count
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn snapshot(&self, queue_depth: usize, running: usize) -> QueueMetrics {
        let counters = self.counters.lock();
        let error_rate = Self::rate(&counters);
        let average_completion_ms = if counters.completed == 0 {
            0.0
        } else {
            counters.total_completion_ms as f64 / counters.completed as f64
        };

        QueueMetrics {
            queue_depth,
            running,
            error_rate,
            system_health: self.config.thresholds.classify(error_rate, queue_depth),
            tasks_completed: counters.completed,
            tasks_failed: counters.failed,
            average_completion_ms,
            window_size: self.config.window_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_is_healthy() {
        let recorder = MetricsRecorder::default();
        let metrics = recorder.snapshot(0, 0);
        assert_eq!(metrics.error_rate, 0.0);
        assert_eq!(metrics.system_health, SystemHealth::Healthy);
    }

    #[test]
    fn thresholds_are_inclusive() {
        let t = HealthThresholds::default();
        assert_eq!(t.classify(0.049, 0), SystemHealth::Healthy);
        assert_eq!(t.classify(0.05, 0), SystemHealth::Degraded);
        assert_eq!(t.classify(0.15, 0), SystemHealth::Critical);
        assert_eq!(t.classify(0.0, 100), SystemHealth::Degraded);
        assert_eq!(t.classify(0.0, 1000), SystemHealth::Critical);
    }

    #[test]
    fn window_drops_old_outcomes() {
        let recorder = MetricsRecorder::new(MetricsConfig {
            window_size: 4,
            ..MetricsConfig::default()
        });
        for _ in 0..4 {
            recorder.record_failure();
        }
        assert_eq!(recorder.error_rate(), 1.0);

        for _ in 0..4 {
            recorder.record_success(Duration::from_millis(10));
        }
        let metrics = recorder.snapshot(0, 0);
        assert_eq!(metrics.error_rate, 0.0);
        assert_eq!(metrics.tasks_failed, 4);
        assert_eq!(metrics.tasks_completed, 4);
        assert_eq!(metrics.average_completion_ms, 10.0);
    }

    #[test]
    fn rising_error_rate_escalates_health() {
        let recorder = MetricsRecorder::default();
        for _ in 0..9 {
            recorder.record_success(Duration::ZERO);
        }
        recorder.record_failure();
        assert!((recorder.error_rate() - 0.1).abs() < f64::EPSILON);
        assert_eq!(recorder.snapshot(0, 0).system_health, SystemHealth::Degraded);

        recorder.record_failure();
        assert_eq!(recorder.snapshot(0, 0).system_health, SystemHealth::Critical);
    }

    #[test]
    fn validation_rejects_bad_config() {
        assert!(MetricsConfig::default().validate().is_ok());

        let zero = MetricsConfig {
            window_size: 0,
            ..MetricsConfig::default()
        };
        assert!(zero.validate().is_err());

        let inverted = MetricsConfig {
            thresholds: HealthThresholds {
                degraded_error_rate: 0.5,
                critical_error_rate: 0.1,
                ..HealthThresholds::default()
            },
            ..MetricsConfig::default()
        };
        assert!(inverted.validate().is_err());
    }
}
