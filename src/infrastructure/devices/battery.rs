//! SMA Sunny Island / Tripower Storage battery

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Battery, Device, ReadingCell};
use crate::domain::{BatteryReading, DeviceCommunicationError, DeviceUpdate, Energy, Power};
use crate::infrastructure::modbus::words::{
    i32_to_words, u32_from_words, u32_to_words, u64_from_words,
};
use crate::infrastructure::modbus::{RegisterConnector, ResilientRegisterClient, TcpConnector};

/// NaN marker for unsigned 32-bit SMA values.
const SMA_NAN_U32: u32 = u32::MAX;

/// Control value that hands charge/discharge power over to Modbus.
pub const EXTERNAL_CONTROL_ENABLED: u32 = 802;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmaBatteryRegisters {
    pub unit_id: u8,
    /// Input pair, state of charge (%).
    pub state_of_charge: u16,
    /// Input quad, energy charged over the battery lifetime (Wh).
    pub lifetime_charged: u16,
    /// Input pair, current charging power (W).
    pub charge_power: u16,
    /// Input pair, current discharging power (W).
    pub discharge_power: u16,
    /// Holding pair, charge/discharge setpoint (W), signed 32-bit.
    pub power_setpoint: u16,
    /// Holding pair, external control mode.
    pub control_mode: u16,
}

impl Default for SmaBatteryRegisters {
    fn default() -> Self {
        Self {
            unit_id: 3,
            state_of_charge: 30845,
            lifetime_charged: 31397,
            charge_power: 31393,
            discharge_power: 31395,
            power_setpoint: 40149,
            control_mode: 40151,
        }
    }
}

pub struct SmaBattery<C: RegisterConnector = TcpConnector> {
    client: ResilientRegisterClient<C>,
    registers: SmaBatteryRegisters,
    state: ReadingCell<BatteryReading>,
}

impl<C: RegisterConnector> SmaBattery<C> {
    pub fn new(connector: C, registers: SmaBatteryRegisters) -> Self {
        Self {
            client: ResilientRegisterClient::new(connector),
            registers,
            state: ReadingCell::new(),
        }
    }

    async fn read_u32(&self, address: u16) -> Result<u32, DeviceCommunicationError> {
        let words = self.client.read_input_registers(address, 2).await?;
        let value = u32_from_words(&words)
            .ok_or_else(|| DeviceCommunicationError::new(self.client.host(), "short reply"))?;
        Ok(if value == SMA_NAN_U32 { 0 } else { value })
    }
}

#[async_trait]
impl<C: RegisterConnector> Device for SmaBattery<C> {
    type Reading = BatteryReading;

    async fn update(&self) -> Result<(), DeviceCommunicationError> {
        let state_of_charge = self.read_u32(self.registers.state_of_charge).await?;
        let charging = self.read_u32(self.registers.charge_power).await?;
        let discharging = self.read_u32(self.registers.discharge_power).await?;

        let words = self
            .client
            .read_input_registers(self.registers.lifetime_charged, 4)
            .await?;
        let lifetime_charged = u64_from_words(&words)
            .ok_or_else(|| DeviceCommunicationError::new(self.client.host(), "short reply"))?;

        let net = i64::from(charging) - i64::from(discharging);
        self.state.store(BatteryReading {
            power: Power(net.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32),
            state_of_charge: state_of_charge.min(100) as u8,
            lifetime_charged: Energy(lifetime_charged),
        });
        Ok(())
    }

    fn state(&self) -> Option<DeviceUpdate<BatteryReading>> {
        self.state.get()
    }
}

#[async_trait]
impl<C: RegisterConnector> Battery for SmaBattery<C> {
    async fn set_charging_power(&self, power: Power) -> Result<(), DeviceCommunicationError> {
        info!(host = self.client.host(), %power, "Setting battery charging power");
        self.client
            .write_multiple_registers(
                self.registers.control_mode,
                &u32_to_words(EXTERNAL_CONTROL_ENABLED),
            )
            .await?;
        self.client
            .write_multiple_registers(self.registers.power_setpoint, &i32_to_words(power.watts()))
            .await
    }
}
