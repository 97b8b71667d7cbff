use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::app::ports::ReadingStorePort;
use crate::domain::{MeterId, RawRow};
use crate::error::Result;
use crate::pipeline::pipeline_config::PipelineConfig;
use crate::pipeline::processing::outcome::BatchResult;
use crate::pipeline::runner::Pipeline;

/// Runs batches through the pipeline and commits the surviving readings.
///
/// Batches for the same meter are serialised; different meters run
/// independently.
pub struct IngestUseCase {
    store: Arc<dyn ReadingStorePort>,
    meter_locks: Mutex<HashMap<MeterId, Arc<Mutex<()>>>>,
    interrupt: Arc<AtomicBool>,
}

impl IngestUseCase {
    pub fn new(store: Arc<dyn ReadingStorePort>) -> Self {
        Self {
            store,
            meter_locks: Mutex::new(HashMap::new()),
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that aborts in-flight batches at the next candidate boundary
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    /// Clear a previous interrupt so new batches run again
    pub fn resume(&self) {
        self.interrupt.store(false, Ordering::Relaxed);
    }

    /// Lock for `meter_id`. Locks no batch holds any more are pruned first.
    async fn meter_lock(&self, meter_id: MeterId) -> Arc<Mutex<()>> {
        let mut locks = self.meter_locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(meter_id).or_default())
    }

    /// Process one batch for `meter_id` and commit it unless it was rejected
    #[instrument(skip(self, config, rows), fields(batch_id = %Uuid::new_v4(), rows = rows.len()))]
    pub async fn ingest_batch(
        &self,
        meter_id: MeterId,
        config: &PipelineConfig,
        rows: Vec<RawRow>,
    ) -> Result<BatchResult> {
        let pipeline = Pipeline::new(meter_id, config)?;
        let lock = self.meter_lock(meter_id).await;
        let _guard = lock.lock().await;

        let started = Instant::now();
        let row_count = rows.len();
        let seed = self.store.load_seed(meter_id).await?;
        let result = pipeline.run_interruptible(rows, seed.as_ref(), &self.interrupt);
        crate::observability::metrics::pipeline::batch_processed(
            &result,
            row_count,
            started.elapsed().as_secs_f64(),
        );

        if result.fatal {
            warn!(meter_id, "batch rejected, nothing committed");
            return Ok(result);
        }

        match self
            .store
            .commit_batch(meter_id, &result.accepted, result.checkpoint.as_ref())
            .await
        {
            Ok(()) => {
                crate::observability::metrics::pipeline::commit_success();
                info!(
                    meter_id,
                    stored = result.accepted.len(),
                    status = ?result.status(),
                    "batch committed"
                );
                Ok(result)
            }
            Err(e) => {
                crate::observability::metrics::pipeline::commit_error();
                error!(meter_id, error = %e, "failed to commit batch");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AcceptedReading, MeterSeed};
    use crate::error::IngestError;
    use crate::pipeline::processing::outcome::BatchStatus;
    use crate::pipeline::storage::InMemoryReadingStore;
    use async_trait::async_trait;

    struct FailingStore;

    #[async_trait]
    impl ReadingStorePort for FailingStore {
        async fn load_seed(&self, _meter_id: MeterId) -> Result<Option<MeterSeed>> {
            Ok(None)
        }

        async fn commit_batch(
            &self,
            _meter_id: MeterId,
            _readings: &[AcceptedReading],
            _checkpoint: Option<&MeterSeed>,
        ) -> Result<()> {
            Err(IngestError::Store {
                message: "disk full".to_string(),
            })
        }
    }

    fn day_row(value: &str, day: u32) -> RawRow {
        RawRow::new(
            value,
            format!("2021-06-{:02}T00:00:00Z", day),
            format!("2021-06-{:02}T00:00:00Z", day + 1),
        )
    }

    #[tokio::test]
    async fn test_batches_continue_from_stored_checkpoint() {
        let store = InMemoryReadingStore::new();
        let use_case = IngestUseCase::new(Arc::new(store.clone()));
        let config = PipelineConfig {
            cumulative: true,
            ..Default::default()
        };

        let first = use_case
            .ingest_batch(9, &config, vec![day_row("100", 1), day_row("103", 2)])
            .await
            .unwrap();
        assert_eq!(first.status(), BatchStatus::PartialFailure);
        assert_eq!(first.accepted.len(), 1);

        let second = use_case
            .ingest_batch(9, &config, vec![day_row("110", 3)])
            .await
            .unwrap();
        assert_eq!(second.status(), BatchStatus::Success);
        assert_eq!(second.accepted[0].value, 7.0);
        assert_eq!(store.readings(9).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rejected_batch_commits_nothing() {
        let store = InMemoryReadingStore::new();
        let use_case = IngestUseCase::new(Arc::new(store.clone()));
        let result = use_case
            .ingest_batch(
                2,
                &PipelineConfig::default(),
                vec![day_row("1", 1), day_row("oops", 2)],
            )
            .await
            .unwrap();
        assert_eq!(result.status(), BatchStatus::Rejected);
        assert!(store.readings(2).unwrap().is_empty());
        assert!(store.load_seed(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_interrupt_rejects_until_resumed() {
        let store = InMemoryReadingStore::new();
        let use_case = IngestUseCase::new(Arc::new(store.clone()));
        use_case.interrupt_handle().store(true, Ordering::Relaxed);

        let config = PipelineConfig::default();
        let result = use_case.ingest_batch(5, &config, vec![day_row("1", 1)]).await.unwrap();
        assert!(result.fatal);
        assert!(store.readings(5).unwrap().is_empty());

        use_case.resume();
        let result = use_case.ingest_batch(5, &config, vec![day_row("1", 1)]).await.unwrap();
        assert_eq!(result.status(), BatchStatus::Success);
    }

    #[tokio::test]
    async fn test_store_failure_is_returned() {
        let use_case = IngestUseCase::new(Arc::new(FailingStore));
        let err = use_case
            .ingest_batch(1, &PipelineConfig::default(), vec![day_row("1", 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Store { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_batches_for_one_meter_are_serialised() {
        let store = InMemoryReadingStore::new();
        let use_case = Arc::new(IngestUseCase::new(Arc::new(store.clone())));
        let config = PipelineConfig {
            length_gap_seconds: 1e9,
            length_variation_seconds: 1e9,
            ..Default::default()
        };

        let a = {
            let use_case = Arc::clone(&use_case);
            let config = config.clone();
            tokio::spawn(async move { use_case.ingest_batch(3, &config, vec![day_row("1", 1)]).await })
        };
        let b = {
            let use_case = Arc::clone(&use_case);
            let config = config.clone();
            tokio::spawn(async move { use_case.ingest_batch(3, &config, vec![day_row("2", 10)]).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(store.readings(3).unwrap().len(), 2);
        assert!(store.load_seed(3).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_idle_meter_locks_are_pruned() {
        let use_case = IngestUseCase::new(Arc::new(InMemoryReadingStore::new()));
        let config = PipelineConfig::default();
        for meter_id in 1..=4 {
            use_case
                .ingest_batch(meter_id, &config, vec![day_row("1", 1)])
                .await
                .unwrap();
        }
        assert_eq!(use_case.meter_locks.lock().await.len(), 1);

        let held = use_case.meter_lock(7).await;
        let _other = use_case.meter_lock(8).await;
        let locks = use_case.meter_locks.lock().await;
        assert!(locks.contains_key(&7));
        assert!(locks.contains_key(&8));
        drop(held);
    }
}
