//! Strongly-typed physical quantities
//!
//! Every reading that crosses a module boundary is wrapped in one of these so
//! that watts never get mixed up with amps.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Active power in watts. Positive means consumption / import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Power(pub i32);

/// RMS voltage in volts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Voltage(pub u32);

/// Current in amps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Current(pub u32);

/// Energy in watt-hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Energy(pub u64);

impl Power {
    pub const ZERO: Power = Power(0);

    pub fn watts(self) -> i32 {
        self.0
    }
}

impl Voltage {
    pub fn volts(self) -> u32 {
        self.0
    }
}

impl Current {
    pub const ZERO: Current = Current(0);

    pub fn amps(self) -> u32 {
        self.0
    }

    /// Clamp into `[min, max]`.
    pub fn clamp_to(self, min: Current, max: Current) -> Current {
        Current(self.0.clamp(min.0, max.0))
    }
}

impl Energy {
    pub fn watt_hours(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Power {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} W", self.0)
    }
}

impl fmt::Display for Voltage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} V", self.0)
    }
}

impl fmt::Display for Current {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} A", self.0)
    }
}

impl fmt::Display for Energy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Wh", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_clamp() {
        assert_eq!(Current(3).clamp_to(Current(6), Current(32)), Current(6));
        assert_eq!(Current(40).clamp_to(Current(6), Current(32)), Current(32));
        assert_eq!(Current(16).clamp_to(Current(6), Current(32)), Current(16));
    }

    #[test]
    fn serializes_as_bare_number() {
        assert_eq!(serde_json::to_string(&Power(-250)).unwrap(), "-250");
        assert_eq!(serde_json::to_string(&Voltage(231)).unwrap(), "231");
    }

    #[test]
    fn display_units() {
        assert_eq!(Power(42).to_string(), "42 W");
        assert_eq!(Current(16).to_string(), "16 A");
        assert_eq!(Energy(1500).to_string(), "1500 Wh");
    }
}
