//! Charge point aggregate
//!
//! Connector state and the small value types exchanged with charge points.

pub mod model;

pub use model::{CommandStatus, ConnectorState, ConnectorStatus, RegistrationStatus};
