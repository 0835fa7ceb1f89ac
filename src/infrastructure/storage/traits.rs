//! Storage port for finished transactions and meter samples

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::domain::Transaction;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

/// One sampled value of a MeterValues message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterSample {
    pub timestamp: DateTime<Utc>,
    /// OCPP measurand, `Energy.Active.Import.Register` when omitted.
    pub measurand: String,
    pub value: String,
    pub unit: Option<String>,
}

/// Meter samples reported for one connector.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterValuesRecord {
    pub charge_point_id: String,
    pub connector_id: u32,
    pub transaction_id: Option<i32>,
    pub samples: Vec<MeterSample>,
}

/// Side-effect sink called by the OCPP session manager.
#[async_trait]
pub trait ChargingRecordStore: Send + Sync {
    /// Called once per completed transaction.
    async fn persist_transaction(&self, transaction: &Transaction) -> Result<(), StorageError>;

    async fn persist_meter_values(&self, record: &MeterValuesRecord) -> Result<(), StorageError>;
}
