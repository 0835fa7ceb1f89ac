//! In-memory record store

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use super::{ChargingRecordStore, MeterValuesRecord, StorageError};
use crate::domain::Transaction;

/// Keeps finished transactions and meter samples for the process lifetime.
#[derive(Default)]
pub struct InMemoryRecordStore {
    transactions: DashMap<i32, Transaction>,
    meter_values: Mutex<Vec<MeterValuesRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transaction(&self, id: i32) -> Option<Transaction> {
        self.transactions.get(&id).map(|t| t.clone())
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    pub async fn meter_values(&self) -> Vec<MeterValuesRecord> {
        self.meter_values.lock().await.clone()
    }
}

#[async_trait]
impl ChargingRecordStore for InMemoryRecordStore {
    async fn persist_transaction(&self, transaction: &Transaction) -> Result<(), StorageError> {
        self.transactions.insert(transaction.id, transaction.clone());
        Ok(())
    }

    async fn persist_meter_values(&self, record: &MeterValuesRecord) -> Result<(), StorageError> {
        self.meter_values.lock().await.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn retains_records() {
        let store = InMemoryRecordStore::new();
        let mut tx = Transaction::start(5, "CP001", 1, "TAG", 0);
        tx.stop(1200, None);

        store.persist_transaction(&tx).await.unwrap();
        store
            .persist_meter_values(&MeterValuesRecord {
                charge_point_id: "CP001".into(),
                connector_id: 1,
                transaction_id: Some(5),
                samples: Vec::new(),
            })
            .await
            .unwrap();

        assert_eq!(store.transaction(5).unwrap().meter_stop, Some(1200));
        assert_eq!(store.transaction_count(), 1);
        assert_eq!(store.meter_values().await.len(), 1);
    }
}
