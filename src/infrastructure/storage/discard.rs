use async_trait::async_trait;
use tracing::trace;

use super::{ChargingRecordStore, MeterValuesRecord, StorageError};
use crate::domain::Transaction;

/// Acknowledges everything and keeps nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardingRecordStore;

#[async_trait]
impl ChargingRecordStore for DiscardingRecordStore {
    async fn persist_transaction(&self, transaction: &Transaction) -> Result<(), StorageError> {
        trace!(transaction_id = transaction.id, "Discarding finished transaction");
        Ok(())
    }

    async fn persist_meter_values(&self, record: &MeterValuesRecord) -> Result<(), StorageError> {
        trace!(
            charge_point_id = record.charge_point_id.as_str(),
            samples = record.samples.len(),
            "Discarding meter values"
        );
        Ok(())
    }
}
