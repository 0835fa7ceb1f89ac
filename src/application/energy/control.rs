//! Operator control surface for the charger setpoint

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use tracing::info;

use crate::domain::{Current, Mode};

/// Configured charging current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentLimits {
    pub min: Current,
    pub max: Current,
}

impl Default for CurrentLimits {
    fn default() -> Self {
        Self {
            min: Current(6),
            max: Current(32),
        }
    }
}

/// Mode and last commanded setpoint, shared between the control loop and
/// whoever drives it from outside.
#[derive(Debug)]
pub struct ModeControl {
    manual: AtomicBool,
    setpoint: AtomicU32,
    limits: CurrentLimits,
}

impl ModeControl {
    pub fn new(limits: CurrentLimits) -> Self {
        Self {
            manual: AtomicBool::new(false),
            setpoint: AtomicU32::new(0),
            limits,
        }
    }

    pub fn limits(&self) -> CurrentLimits {
        self.limits
    }

    pub fn mode(&self) -> Mode {
        if self.manual.load(Ordering::SeqCst) {
            Mode::Manual
        } else {
            Mode::Auto
        }
    }

    pub fn set_auto(&self) {
        info!("Energy manager switched to AUTO");
        self.manual.store(false, Ordering::SeqCst);
    }

    /// Switch to MANUAL at `current`. Zero stops charging, anything else is
    /// clamped to the configured limits.
    pub fn set_manual(&self, current: Current) {
        let current = if current == Current::ZERO {
            current
        } else {
            current.clamp_to(self.limits.min, self.limits.max)
        };
        self.setpoint.store(current.amps(), Ordering::SeqCst);
        self.manual.store(true, Ordering::SeqCst);
        info!(setpoint = current.amps(), "Energy manager switched to MANUAL");
    }

    /// Last commanded setpoint.
    pub fn setpoint(&self) -> Current {
        Current(self.setpoint.load(Ordering::SeqCst))
    }

    pub(crate) fn record_setpoint(&self, current: Current) {
        self.setpoint.store(current.amps(), Ordering::SeqCst);
    }
}

impl Default for ModeControl {
    fn default() -> Self {
        Self::new(CurrentLimits::default())
    }
}
