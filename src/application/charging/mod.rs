pub mod commands;
pub mod session;

pub use commands::{CommandError, ResetKind};
pub use session::{ChargePointSession, OcppSessionManager, PendingCall, SharedSessionManager};
