use async_trait::async_trait;

use crate::domain::{AcceptedReading, MeterId, MeterSeed};
use crate::error::Result;

/// Persistence seam for accepted readings and per-meter checkpoints
#[async_trait]
pub trait ReadingStorePort: Send + Sync {
    /// Checkpoint left by the meter's last committed batch, if any
    async fn load_seed(&self, meter_id: MeterId) -> Result<Option<MeterSeed>>;

    /// Store a batch's readings and its new checkpoint as one unit
    async fn commit_batch(
        &self,
        meter_id: MeterId,
        readings: &[AcceptedReading],
        checkpoint: Option<&MeterSeed>,
    ) -> Result<()>;
}
