//! Per-cycle and cumulative pipeline counters

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Outcome counts for one ingestion cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub started_at: DateTime<Utc>,
    /// Reports taken from the queue
    pub drained: u64,
    /// Events written
    pub accepted: u64,
    pub rejected: u64,
    pub deduplicated: u64,
    pub fallback_used: u64,
    pub inference_used: u64,
    pub store_failed: u64,
    /// Reports evicted from the full queue since the previous cycle
    pub queue_dropped: u64,
    /// Drained but left unprocessed because shutdown began mid-cycle
    pub abandoned: u64,
    pub duration_ms: u64,
}

impl CycleReport {
    pub fn new(cycle: u64, started_at: DateTime<Utc>) -> Self {
        Self {
            cycle,
            started_at,
            drained: 0,
            accepted: 0,
            rejected: 0,
            deduplicated: 0,
            fallback_used: 0,
            inference_used: 0,
            store_failed: 0,
            queue_dropped: 0,
            abandoned: 0,
            duration_ms: 0,
        }
    }
}

/// Running totals since startup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineTotals {
    pub cycles: u64,
    pub drained: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub deduplicated: u64,
    pub fallback_used: u64,
    pub inference_used: u64,
    pub store_failed: u64,
    pub queue_dropped: u64,
}

impl PipelineTotals {
    pub fn absorb(&mut self, report: &CycleReport) {
        self.cycles += 1;
        self.drained += report.drained;
        self.accepted += report.accepted;
        self.rejected += report.rejected;
        self.deduplicated += report.deduplicated;
        self.fallback_used += report.fallback_used;
        self.inference_used += report.inference_used;
        self.store_failed += report.store_failed;
        self.queue_dropped += report.queue_dropped;
    }
}

/// What the scheduler publishes after every cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestStatus {
    pub last_cycle: Option<CycleReport>,
    pub totals: PipelineTotals,
}
