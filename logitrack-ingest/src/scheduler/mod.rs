//! Ingestion cycle scheduler
//!
//! One cycle per tick: restore the classifier budget, drain the report
//! queue, and push every report through normalize, classify and persist in
//! order. Nothing inside a cycle can stop the scheduler; only cancellation
//! does, and then only between reports.

pub mod statistics;

pub use statistics::{CycleReport, IngestStatus, PipelineTotals};

use crate::feed::{
    build_source, ConnectionState, FeedMetrics, RawReport, ReportQueue, ReportSource,
    SourceContext, SourceMode,
};
use crate::services::{
    ClassificationEngine, ClassificationSource, NormalizeError, Normalizer, PersistenceGateway,
    StoreOutcome,
};
use chrono::Utc;
use logitrack_common::config::IngestConfig;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct CycleScheduler {
    queue: ReportQueue,
    normalizer: Normalizer,
    engine: ClassificationEngine,
    gateway: PersistenceGateway,
    interval: Duration,
    cycle: u64,
    totals: PipelineTotals,
    status: watch::Sender<IngestStatus>,
}

impl CycleScheduler {
    pub fn new(
        config: &IngestConfig,
        pool: SqlitePool,
        queue: ReportQueue,
        engine: ClassificationEngine,
    ) -> Self {
        let (status, _) = watch::channel(IngestStatus::default());
        Self {
            queue,
            normalizer: Normalizer::new(pool.clone(), config.store.max_attempts),
            engine,
            gateway: PersistenceGateway::new(pool, config.dedup.clone(), config.store.max_attempts),
            interval: config.cycle_interval(),
            cycle: 0,
            totals: PipelineTotals::default(),
            status,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<IngestStatus> {
        self.status.subscribe()
    }

    /// Run cycles until cancelled
    pub async fn run(mut self, cancel: CancellationToken) {
        let start = tokio::time::Instant::now() + self.interval;
        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = self.interval.as_secs(), "Cycle scheduler started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.run_cycle(&cancel).await;
                }
            }
        }

        info!(cycles = self.cycle, "Cycle scheduler stopped");
    }

    /// Execute one cycle immediately
    pub async fn run_cycle(&mut self, cancel: &CancellationToken) -> CycleReport {
        self.cycle += 1;
        let started = Instant::now();
        let mut report = CycleReport::new(self.cycle, Utc::now());

        self.engine.begin_cycle();
        report.queue_dropped = self.queue.take_dropped();
        let batch = self.queue.drain();
        report.drained = batch.len() as u64;

        let total = batch.len();
        for (processed, raw) in batch.into_iter().enumerate() {
            if cancel.is_cancelled() {
                report.abandoned = (total - processed) as u64;
                debug!(abandoned = report.abandoned, "Shutdown requested, stopping mid-cycle");
                break;
            }
            self.process(raw, &mut report).await;
        }

        report.duration_ms = started.elapsed().as_millis() as u64;

        if report.queue_dropped > 0 {
            warn!(dropped = report.queue_dropped, "Report queue overflowed since last cycle");
        }
        info!(
            cycle = report.cycle,
            drained = report.drained,
            accepted = report.accepted,
            rejected = report.rejected,
            deduplicated = report.deduplicated,
            fallback_used = report.fallback_used,
            inference_used = report.inference_used,
            store_failed = report.store_failed,
            duration_ms = report.duration_ms,
            "Ingestion cycle complete"
        );

        self.totals.absorb(&report);
        let totals = self.totals.clone();
        let published = report.clone();
        self.status.send_modify(|status| {
            status.last_cycle = Some(published);
            status.totals = totals;
        });

        report
    }

    async fn process(&mut self, raw: RawReport, report: &mut CycleReport) {
        let event = match self.normalizer.normalize(&raw).await {
            Ok(event) => event,
            Err(NormalizeError::Rejected(reason)) => {
                report.rejected += 1;
                warn!(external_id = %raw.external_id, reason = %reason, "Report rejected");
                return;
            }
            Err(NormalizeError::Store(e)) => {
                report.store_failed += 1;
                error!(
                    external_id = %raw.external_id,
                    error = %e,
                    "Entity resolution failed, report dropped"
                );
                return;
            }
        };

        let (classification, source) = self
            .engine
            .classify(
                &event.external_id,
                &event.raw_status_text,
                event.nav_hint.as_ref(),
                event.timestamp,
            )
            .await;
        match source {
            ClassificationSource::Inference => report.inference_used += 1,
            ClassificationSource::Fallback => report.fallback_used += 1,
        }

        match self.gateway.upsert(&event, classification).await {
            Ok(StoreOutcome::Stored { .. }) => report.accepted += 1,
            Ok(StoreOutcome::Deduplicated) => report.deduplicated += 1,
            Err(e) => {
                report.store_failed += 1;
                error!(
                    external_id = %event.external_id,
                    error = %e,
                    "Event write failed, dropped for this cycle"
                );
            }
        }
    }
}

/// Read-only view of a running pipeline
#[derive(Clone)]
pub struct PipelineMonitor {
    pub mode: SourceMode,
    /// Name of the running source, e.g. "aisstream"
    pub source: &'static str,
    pub connection: watch::Receiver<ConnectionState>,
    pub status: watch::Receiver<IngestStatus>,
    pub feed: Arc<FeedMetrics>,
    pub queue: ReportQueue,
}

/// The background task tree: one source task and one scheduler task
pub struct IngestPipeline {
    cancel: CancellationToken,
    source_task: JoinHandle<()>,
    scheduler_task: JoinHandle<()>,
    monitor: PipelineMonitor,
}

impl IngestPipeline {
    /// Start the configured source and the scheduler
    pub fn spawn(config: &IngestConfig, pool: SqlitePool, cancel: CancellationToken) -> Self {
        let engine = ClassificationEngine::from_config(&config.classifier);
        Self::spawn_with(config, pool, build_source(config), engine, cancel)
    }

    /// Start with an explicit source and engine
    pub fn spawn_with(
        config: &IngestConfig,
        pool: SqlitePool,
        source: Box<dyn ReportSource>,
        engine: ClassificationEngine,
        cancel: CancellationToken,
    ) -> Self {
        let queue = ReportQueue::new(config.queue_capacity);
        let ctx = SourceContext::new(queue.clone(), cancel.clone());
        let scheduler = CycleScheduler::new(config, pool, queue.clone(), engine);

        let monitor = PipelineMonitor {
            mode: source.mode(),
            source: source.name(),
            connection: ctx.subscribe_state(),
            status: scheduler.subscribe(),
            feed: ctx.metrics.clone(),
            queue,
        };

        info!(source = source.name(), "Starting ingestion pipeline");
        let source_task = tokio::spawn(source.run(ctx));
        let scheduler_task = tokio::spawn(scheduler.run(cancel.clone()));

        Self {
            cancel,
            source_task,
            scheduler_task,
            monitor,
        }
    }

    pub fn monitor(&self) -> PipelineMonitor {
        self.monitor.clone()
    }

    /// Cancel and wait for both tasks
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.join().await;
    }

    /// Wait for both tasks; the scheduler stops first, then the source
    pub async fn join(self) {
        if let Err(e) = self.scheduler_task.await {
            error!(error = %e, "Scheduler task failed");
        }
        if let Err(e) = self.source_task.await {
            error!(error = %e, "Source task failed");
        }
        info!("Ingestion pipeline stopped");
    }
}
