//! Energy balancing

mod control;
mod manager;

pub use control::{CurrentLimits, ModeControl};
pub use manager::{compute_setpoint, EnergyDevices, EnergyManager, EnergyManagerSettings};
