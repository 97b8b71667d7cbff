use crate::app::ports::ReadingStorePort;
use crate::domain::{AcceptedReading, MeterId, MeterSeed};
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

#[derive(Default)]
struct Tables {
    readings: HashMap<MeterId, Vec<AcceptedReading>>,
    seeds: HashMap<MeterId, MeterSeed>,
}

/// In-memory reading store for development/testing
#[derive(Clone, Default)]
pub struct InMemoryReadingStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryReadingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables.lock().map_err(|e| IngestError::Store {
            message: format!("reading store lock poisoned: {}", e),
        })
    }

    /// All readings stored for a meter, in commit order
    pub fn readings(&self, meter_id: MeterId) -> Result<Vec<AcceptedReading>> {
        Ok(self
            .lock()?
            .readings
            .get(&meter_id)
            .cloned()
            .unwrap_or_default())
    }

    /// Install a checkpoint directly, as if a previous batch had committed it
    pub fn put_seed(&self, meter_id: MeterId, seed: MeterSeed) -> Result<()> {
        self.lock()?.seeds.insert(meter_id, seed);
        Ok(())
    }
}

#[async_trait]
impl ReadingStorePort for InMemoryReadingStore {
    async fn load_seed(&self, meter_id: MeterId) -> Result<Option<MeterSeed>> {
        Ok(self.lock()?.seeds.get(&meter_id).cloned())
    }

    async fn commit_batch(
        &self,
        meter_id: MeterId,
        readings: &[AcceptedReading],
        checkpoint: Option<&MeterSeed>,
    ) -> Result<()> {
        let mut tables = self.lock()?;
        tables
            .readings
            .entry(meter_id)
            .or_default()
            .extend_from_slice(readings);
        if let Some(seed) = checkpoint {
            tables.seeds.insert(meter_id, seed.clone());
        }
        debug!(meter_id, stored = readings.len(), "committed batch to memory");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    #[tokio::test]
    async fn test_commit_appends_and_moves_seed() {
        let store = InMemoryReadingStore::new();
        assert!(store.load_seed(4).await.unwrap().is_none());

        let start = Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).unwrap();
        let reading = AcceptedReading {
            meter_id: 4,
            value: 2.5,
            start,
            end: start + Duration::hours(1),
        };
        let seed = MeterSeed {
            last_start: Some(reading.start),
            last_end: reading.end,
            last_raw_cumulative: None,
        };
        store
            .commit_batch(4, &[reading.clone()], Some(&seed))
            .await
            .unwrap();
        store.commit_batch(4, &[reading.clone()], None).await.unwrap();

        assert_eq!(store.readings(4).unwrap().len(), 2);
        assert_eq!(store.load_seed(4).await.unwrap(), Some(seed));
        assert!(store.readings(5).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_seed_is_loaded_back() {
        let store = InMemoryReadingStore::new();
        let seed = MeterSeed {
            last_start: None,
            last_end: Utc.with_ymd_and_hms(2021, 6, 2, 0, 0, 0).unwrap(),
            last_raw_cumulative: Some(42.0),
        };
        store.put_seed(9, seed.clone()).unwrap();
        assert_eq!(store.load_seed(9).await.unwrap(), Some(seed));
        assert!(store.readings(9).unwrap().is_empty());
    }
}
