mod actions;
pub mod connection;
pub mod registry;

pub use connection::{ChargePointSession, PendingCall};
pub use registry::{OcppSessionManager, SharedSessionManager, DEFAULT_HEARTBEAT_INTERVAL};
