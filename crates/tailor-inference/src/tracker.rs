//! Cost calculation and invocation recording.
//!
//! [`CostTracker::record`] never blocks: records go onto a bounded channel
//! drained by a background recorder task that appends them to the
//! [`InvocationRepository`]. A full queue or a failing repository is logged
//! and the record is dropped; the caller never sees the error.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use tailor_core::{
    count_prompt_tokens, defaults, CompletionRequest, Error, InvocationRecord,
    InvocationRepository, PerformanceSummary, Result,
};

use crate::profiles::ModelRegistry;

/// Counters for the recorder queue.
#[derive(Debug, Default)]
struct RecorderCounters {
    enqueued: AtomicU64,
    dropped: AtomicU64,
    persisted: AtomicU64,
    failed: AtomicU64,
}

/// Snapshot of recorder counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecorderStats {
    /// Records accepted onto the queue.
    pub enqueued: u64,
    /// Records rejected because the queue was full or closed.
    pub dropped: u64,
    /// Records written to the repository.
    pub persisted: u64,
    /// Records the repository failed to store.
    pub failed: u64,
}

impl RecorderCounters {
    fn snapshot(&self) -> RecorderStats {
        RecorderStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Handle for stopping the background recorder.
///
/// Dropping the handle also stops the recorder after it drains the queue.
pub struct RecorderHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
    counters: Arc<RecorderCounters>,
}

impl RecorderHandle {
    /// Signal the recorder to drain pending records and stop.
    pub async fn shutdown(self) -> Result<RecorderStats> {
        // A closed channel means the recorder already exited.
        let _ = self.shutdown_tx.send(()).await;
        self.task
            .await
            .map_err(|e| Error::Internal(format!("Recorder task failed: {}", e)))?;
        Ok(self.counters.snapshot())
    }

    pub fn stats(&self) -> RecorderStats {
        self.counters.snapshot()
    }
}

/// Cost calculator and fire-and-forget invocation recorder.
#[derive(Clone)]
pub struct CostTracker {
    registry: Arc<ModelRegistry>,
    repository: Arc<dyn InvocationRepository>,
    sender: mpsc::Sender<InvocationRecord>,
    counters: Arc<RecorderCounters>,
}

impl CostTracker {
    /// Create a tracker and spawn its recorder on the current tokio runtime.
    pub fn start(
        registry: Arc<ModelRegistry>,
        repository: Arc<dyn InvocationRepository>,
        queue_capacity: usize,
    ) -> (Self, RecorderHandle) {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let counters = Arc::new(RecorderCounters::default());

        let task = tokio::spawn(run_recorder(
            Arc::clone(&repository),
            receiver,
            shutdown_rx,
            Arc::clone(&counters),
        ));

        info!(
            subsystem = "tracker",
            queue_capacity, "Invocation recorder started"
        );

        let tracker = Self {
            registry,
            repository,
            sender,
            counters: Arc::clone(&counters),
        };
        let handle = RecorderHandle {
            shutdown_tx,
            task,
            counters,
        };
        (tracker, handle)
    }

    /// Create a tracker with the default queue capacity.
    pub fn start_default(
        registry: Arc<ModelRegistry>,
        repository: Arc<dyn InvocationRepository>,
    ) -> (Self, RecorderHandle) {
        Self::start(registry, repository, defaults::RECORDER_QUEUE_CAPACITY)
    }

    /// USD cost of a call with the given token counts.
    pub fn calculate_cost(&self, model_id: &str, tokens_in: u64, tokens_out: u64) -> Result<f64> {
        Ok(self.registry.require(model_id)?.cost_for(tokens_in, tokens_out))
    }

    /// Estimated USD cost of a completion: prompt tokens plus the full output
    /// budget.
    pub fn estimate_cost(&self, model_id: &str, request: &CompletionRequest) -> Result<f64> {
        let tokens_in = count_prompt_tokens(request) as u64;
        let tokens_out = u64::from(request.max_tokens_or_default());
        self.calculate_cost(model_id, tokens_in, tokens_out)
    }

    /// Enqueue a record for persistence without waiting.
    pub fn record(&self, record: InvocationRecord) {
        match self.sender.try_send(record) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(record)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    subsystem = "tracker",
                    op = "record",
                    invocation_id = %record.id,
                    model = %record.model_id,
                    "Recorder queue full, invocation record dropped"
                );
            }
            Err(mpsc::error::TrySendError::Closed(record)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    subsystem = "tracker",
                    op = "record",
                    invocation_id = %record.id,
                    model = %record.model_id,
                    "Recorder stopped, invocation record dropped"
                );
            }
        }
    }

    /// Performance of `model_id` over the trailing `window`.
    pub async fn aggregate(
        &self,
        model_id: &str,
        window: ChronoDuration,
    ) -> Result<PerformanceSummary> {
        let until = Utc::now();
        let since = until - window;
        self.repository.aggregate(model_id, since, until).await
    }

    /// Performance of `model_id` over the default window.
    pub async fn aggregate_default(&self, model_id: &str) -> Result<PerformanceSummary> {
        self.aggregate(
            model_id,
            ChronoDuration::hours(defaults::AGGREGATE_WINDOW_HOURS),
        )
        .await
    }

    pub fn stats(&self) -> RecorderStats {
        self.counters.snapshot()
    }
}

async fn run_recorder(
    repository: Arc<dyn InvocationRepository>,
    mut receiver: mpsc::Receiver<InvocationRecord>,
    mut shutdown_rx: mpsc::Receiver<()>,
    counters: Arc<RecorderCounters>,
) {
    loop {
        tokio::select! {
            biased;
            maybe = receiver.recv() => match maybe {
                Some(record) => persist(repository.as_ref(), record, &counters).await,
                None => break,
            },
            _ = shutdown_rx.recv() => {
                receiver.close();
                while let Some(record) = receiver.recv().await {
                    persist(repository.as_ref(), record, &counters).await;
                }
                break;
            }
        }
    }

    let stats = counters.snapshot();
    info!(
        subsystem = "tracker",
        persisted = stats.persisted,
        failed = stats.failed,
        dropped = stats.dropped,
        "Invocation recorder stopped"
    );
}

async fn persist(
    repository: &dyn InvocationRepository,
    record: InvocationRecord,
    counters: &RecorderCounters,
) {
    match repository.insert(&record).await {
        Ok(()) => {
            counters.persisted.fetch_add(1, Ordering::Relaxed);
            debug!(
                subsystem = "tracker",
                op = "persist",
                invocation_id = %record.id,
                model = %record.model_id,
                cost_usd = record.cost_usd,
                success = record.success,
                "Invocation recorded"
            );
        }
        Err(e) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            error!(
                subsystem = "tracker",
                op = "persist",
                invocation_id = %record.id,
                model = %record.model_id,
                error = %e,
                "Failed to persist invocation record"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::sync::Mutex;
    use tailor_core::{ChatMessage, TaskType};

    #[derive(Default)]
    struct VecRepo {
        records: Mutex<Vec<InvocationRecord>>,
        fail: bool,
    }

    #[async_trait]
    impl InvocationRepository for VecRepo {
        async fn insert(&self, record: &InvocationRecord) -> Result<()> {
            if self.fail {
                return Err(Error::Internal("disk full".into()));
            }
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn aggregate(
            &self,
            model_id: &str,
            since: DateTime<Utc>,
            until: DateTime<Utc>,
        ) -> Result<PerformanceSummary> {
            let records = self.records.lock().unwrap();
            Ok(PerformanceSummary::from_records(model_id, since, until, records.iter()))
        }

        async fn list_recent(
            &self,
            _model_id: Option<&str>,
            _limit: i64,
        ) -> Result<Vec<InvocationRecord>> {
            Ok(self.records.lock().unwrap().clone())
        }
    }

    fn registry() -> Arc<ModelRegistry> {
        Arc::new(ModelRegistry::new())
    }

    #[tokio::test]
    async fn test_calculate_cost_one_million_input_tokens() {
        let reg = registry();
        let (tracker, handle) = CostTracker::start_default(reg.clone(), Arc::new(VecRepo::default()));
        for profile in reg.list() {
            assert_eq!(
                tracker.calculate_cost(&profile.id, 1_000_000, 0).unwrap(),
                profile.cost_input_per_mtok,
                "{}",
                profile.id
            );
        }
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_calculate_cost_mixed() {
        let (tracker, handle) = CostTracker::start_default(registry(), Arc::new(VecRepo::default()));
        // 2000 in at $2.50/M + 1000 out at $10/M
        let cost = tracker.calculate_cost("gpt-4o", 2000, 1000).unwrap();
        assert!((cost - 0.015).abs() < 1e-12);
        assert!(matches!(
            tracker.calculate_cost("gpt-9", 1, 1),
            Err(Error::Config(_))
        ));
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_estimate_cost_includes_output_budget() {
        let (tracker, handle) = CostTracker::start_default(registry(), Arc::new(VecRepo::default()));
        let request =
            CompletionRequest::new(vec![ChatMessage::user("Tailor my CV")]).with_max_tokens(1000);
        let estimate = tracker.estimate_cost("gpt-4o", &request).unwrap();
        let output_only = tracker.calculate_cost("gpt-4o", 0, 1000).unwrap();
        assert!(estimate > output_only);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_record_persists_and_shutdown_drains() {
        let repo = Arc::new(VecRepo::default());
        let (tracker, handle) = CostTracker::start(registry(), repo.clone(), 16);

        for i in 0..10 {
            tracker.record(InvocationRecord::success("gpt-4o", TaskType::CvGeneration, i, 10, 10, 0.01));
        }
        let stats = handle.shutdown().await.unwrap();

        assert_eq!(stats.enqueued, 10);
        assert_eq!(stats.persisted, 10);
        assert_eq!(repo.records.lock().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_repository_failure_is_swallowed() {
        let repo = Arc::new(VecRepo {
            fail: true,
            ..Default::default()
        });
        let (tracker, handle) = CostTracker::start(registry(), repo, 4);
        tracker.record(InvocationRecord::failure("gpt-4o", TaskType::JobParsing, 5));
        let stats = handle.shutdown().await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.persisted, 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_full_queue_drops_without_blocking() {
        let repo = Arc::new(VecRepo::default());
        let (tracker, handle) = CostTracker::start(registry(), repo.clone(), 2);

        // The recorder cannot run until this task yields.
        for i in 0..5 {
            tracker.record(InvocationRecord::success("gpt-4o", TaskType::CvGeneration, i, 1, 1, 0.0));
        }
        assert_eq!(tracker.stats().enqueued, 2);
        assert_eq!(tracker.stats().dropped, 3);

        let stats = handle.shutdown().await.unwrap();
        assert_eq!(stats.persisted, 2);
    }

    #[tokio::test]
    async fn test_record_after_shutdown_is_dropped() {
        let (tracker, handle) = CostTracker::start(registry(), Arc::new(VecRepo::default()), 4);
        handle.shutdown().await.unwrap();
        tracker.record(InvocationRecord::failure("gpt-4o", TaskType::JobParsing, 1));
        assert_eq!(tracker.stats().dropped, 1);
    }

    #[tokio::test]
    async fn test_aggregate_over_window() {
        let repo = Arc::new(VecRepo::default());
        {
            let mut records = repo.records.lock().unwrap();
            records.push(
                InvocationRecord::success("gpt-4o", TaskType::CvGeneration, 100, 1, 1, 0.10)
                    .with_quality(0.9),
            );
            records.push(InvocationRecord::failure("gpt-4o", TaskType::CvGeneration, 300));
            records.push(
                InvocationRecord::success("gpt-4o", TaskType::CvGeneration, 100, 1, 1, 5.0)
                    .at(Utc::now() - ChronoDuration::days(3)),
            );
        }
        let (tracker, handle) = CostTracker::start(registry(), repo, 4);

        let summary = tracker.aggregate_default("gpt-4o").await.unwrap();
        assert_eq!(summary.invocations, 2);
        assert!((summary.success_rate - 0.5).abs() < 1e-9);
        assert!((summary.avg_latency_ms - 200.0).abs() < 1e-9);
        assert!((summary.total_cost_usd - 0.10).abs() < 1e-9);
        assert_eq!(summary.avg_quality_score, Some(0.9));

        handle.shutdown().await.unwrap();
    }
}
