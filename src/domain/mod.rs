//! Domain layer
//!
//! Physical quantities, the published energy state, the OCPP charge-point
//! model and the error taxonomy shared by every other layer.

pub mod charge_point;
pub mod energy;
pub mod error;
pub mod measurement;
pub mod transaction;

pub use charge_point::{CommandStatus, ConnectorState, ConnectorStatus, RegistrationStatus};
pub use energy::{BatteryReading, CombinedState, DeviceUpdate, GridReading, Mode};
pub use error::{DeviceCommunicationError, MeterUnavailableError, OcppError};
pub use measurement::{Current, Energy, Power, Voltage};
pub use transaction::Transaction;
