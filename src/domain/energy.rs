//! Energy-management state published by the control loop

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::measurement::{Energy, Power, Voltage};

/// How the charger setpoint is chosen each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Setpoint follows the available power.
    #[default]
    Auto,
    /// Setpoint is held at the last explicitly commanded value.
    Manual,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// A cached device reading together with the time it was taken.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceUpdate<T> {
    pub timestamp: DateTime<Utc>,
    pub reading: T,
}

impl<T> DeviceUpdate<T> {
    pub fn now(reading: T) -> Self {
        Self {
            timestamp: Utc::now(),
            reading,
        }
    }
}

/// Grid connection point reading (single-phase voltage is enough for the
/// current computation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridReading {
    pub power: Power,
    pub voltage: Voltage,
}

/// Home battery reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryReading {
    /// Net battery power; positive while charging.
    pub power: Power,
    /// State of charge in percent.
    pub state_of_charge: u8,
    /// Energy charged into the battery over its lifetime.
    pub lifetime_charged: Energy,
}

/// Snapshot of all device readings for one control cycle.
///
/// Every field is independently absent when that device's poll failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedState {
    pub grid_power: Option<Power>,
    pub grid_voltage: Option<Voltage>,
    pub charger_power: Option<Power>,
    pub heat_pump_power: Option<Power>,
    pub solar_power: Option<Power>,
    pub battery_power: Option<Power>,
    /// Battery state of charge in percent.
    pub battery_charge: Option<u8>,
    pub timestamp: DateTime<Utc>,
}

impl CombinedState {
    /// A snapshot with no readings at all.
    pub fn empty() -> Self {
        Self {
            grid_power: None,
            grid_voltage: None,
            charger_power: None,
            heat_pump_power: None,
            solar_power: None,
            battery_power: None,
            battery_charge: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_grid(mut self, grid: Option<GridReading>) -> Self {
        self.grid_power = grid.map(|g| g.power);
        self.grid_voltage = grid.map(|g| g.voltage);
        self
    }

    pub fn with_battery(mut self, battery: Option<BatteryReading>) -> Self {
        self.battery_power = battery.map(|b| b.power);
        self.battery_charge = battery.map(|b| b.state_of_charge);
        self
    }
}

impl Default for CombinedState {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_are_independent() {
        let state = CombinedState::empty()
            .with_grid(Some(GridReading {
                power: Power(500),
                voltage: Voltage(230),
            }))
            .with_battery(None);

        assert_eq!(state.grid_power, Some(Power(500)));
        assert_eq!(state.grid_voltage, Some(Voltage(230)));
        assert_eq!(state.charger_power, None);
        assert_eq!(state.battery_charge, None);
    }

    #[test]
    fn serializes_camel_case_with_nulls() {
        let mut state = CombinedState::empty();
        state.heat_pump_power = Some(Power(1200));
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["heatPumpPower"], 1200);
        assert!(json["gridPower"].is_null());
    }

    #[test]
    fn mode_defaults_to_auto() {
        assert_eq!(Mode::default(), Mode::Auto);
        assert_eq!(Mode::Manual.to_string(), "manual");
    }
}
