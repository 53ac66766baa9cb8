use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{maturity::MaturitySummary, models::MentalHealthSnapshot};

/// Point-in-time copy of the engine-wide counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct PerformanceSnapshot {
    /// Requests received, rejected ones included.
    pub total_requests: u64,
    /// Cycles that produced a response.
    pub successful_decisions: u64,
    /// Requests rejected before a cycle started.
    pub failed_decisions: u64,
    /// Responses that carried the fallback plan.
    pub fallback_decisions: u64,
    /// Responses produced while a collaborator was unavailable.
    pub degraded_decisions: u64,
    /// Mean confidence over successful decisions.
    pub average_confidence: f64,
    /// Mean wall time per request, in milliseconds.
    pub average_response_ms: f64,
}

impl PerformanceSnapshot {
    /// Share of requests that produced a response.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let rate = self.successful_decisions as f64 / self.total_requests as f64;
        rate
    }

    #[allow(clippy::cast_precision_loss)]
    fn track_elapsed(&mut self, elapsed: Duration) {
        self.total_requests += 1;
        let millis = elapsed.as_secs_f64() * 1_000.0;
        self.average_response_ms +=
            (millis - self.average_response_ms) / self.total_requests as f64;
    }
}

/// Counters shared by every clone of an orchestrator.
#[derive(Debug, Clone)]
pub struct PerformanceCounters {
    started_at: DateTime<Utc>,
    inner: Arc<Mutex<PerformanceSnapshot>>,
}

impl Default for PerformanceCounters {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            inner: Arc::new(Mutex::new(PerformanceSnapshot::default())),
        }
    }
}

impl PerformanceCounters {
    /// Records a completed cycle.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_decision(
        &self,
        confidence: f64,
        fallback_used: bool,
        degraded: bool,
        elapsed: Duration,
    ) {
        let mut counters = self.inner.lock();
        counters.track_elapsed(elapsed);
        counters.successful_decisions += 1;
        counters.fallback_decisions += u64::from(fallback_used);
        counters.degraded_decisions += u64::from(degraded);
        counters.average_confidence +=
            (confidence - counters.average_confidence) / counters.successful_decisions as f64;
    }

    /// Records a rejected request.
    pub fn record_rejection(&self, elapsed: Duration) {
        let mut counters = self.inner.lock();
        counters.track_elapsed(elapsed);
        counters.failed_decisions += 1;
    }

    /// Current counter values.
    #[must_use]
    pub fn snapshot(&self) -> PerformanceSnapshot {
        *self.inner.lock()
    }

    /// When counting started.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// Combined operator view of one agent and the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineStatus {
    /// Agent the maturity and mental-health views describe.
    pub agent: String,
    /// When the orchestrator started counting.
    pub started_at: DateTime<Utc>,
    /// Seconds since `started_at`.
    pub uptime_secs: f64,
    /// Developmental view.
    pub maturity: MaturitySummary,
    /// Behavioral view.
    pub mental_health: MentalHealthSnapshot,
    /// Recommendations for the current mental-health status.
    pub recommendations: Vec<String>,
    /// Engine-wide counters.
    pub performance: PerformanceSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_means_track_each_kind_of_request() {
        let counters = PerformanceCounters::default();
        counters.record_decision(0.8, false, false, Duration::from_millis(10));
        counters.record_decision(0.4, true, true, Duration::from_millis(30));
        counters.record_rejection(Duration::from_millis(2));

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.total_requests, 3);
        assert_eq!(snapshot.successful_decisions, 2);
        assert_eq!(snapshot.failed_decisions, 1);
        assert_eq!(snapshot.fallback_decisions, 1);
        assert_eq!(snapshot.degraded_decisions, 1);
        assert!((snapshot.average_confidence - 0.6).abs() < 1e-9);
        assert!((snapshot.average_response_ms - 14.0).abs() < 1e-6);
        assert!((snapshot.success_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn clones_share_counters() {
        let counters = PerformanceCounters::default();
        let shared = counters.clone();
        shared.record_rejection(Duration::ZERO);
        assert_eq!(counters.snapshot().failed_decisions, 1);
        assert_eq!(counters.started_at(), shared.started_at());
        assert!(PerformanceSnapshot::default().success_rate().abs() < f64::EPSILON);
    }
}
