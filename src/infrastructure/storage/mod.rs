//! Charging-record storage port and implementations

mod discard;
mod memory;
mod traits;

pub use discard::DiscardingRecordStore;
pub use memory::InMemoryRecordStore;
pub use traits::{ChargingRecordStore, MeterSample, MeterValuesRecord, StorageError};
