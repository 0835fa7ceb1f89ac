pub mod charging;
pub mod energy;
pub mod handlers;

// Re-export key types for convenience
pub use charging::{
    ChargePointSession, CommandError, OcppSessionManager, ResetKind, SharedSessionManager,
};
pub use energy::{
    compute_setpoint, CurrentLimits, EnergyDevices, EnergyManager, EnergyManagerSettings,
    ModeControl,
};
pub use handlers::{OcppMessageRouter, SUPPORTED_ACTIONS};
