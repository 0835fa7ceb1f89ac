//! Daikin Altherma heat pump through the Daikin Home Hub

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Device, HeatPump, ReadingCell};
use crate::domain::{DeviceCommunicationError, DeviceUpdate, Power};
use crate::infrastructure::modbus::words::i16_from_words;
use crate::infrastructure::modbus::{RegisterConnector, ResilientRegisterClient, TcpConnector};

/// The hub reports power in units of 10 W.
const POWER_SCALE: i32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaikinRegisters {
    pub unit_id: u8,
    /// Input register, current power consumption, signed 16-bit.
    pub power: u16,
}

impl Default for DaikinRegisters {
    fn default() -> Self {
        Self {
            unit_id: 1,
            power: 50,
        }
    }
}

pub struct DaikinHeatPump<C: RegisterConnector = TcpConnector> {
    client: ResilientRegisterClient<C>,
    registers: DaikinRegisters,
    state: ReadingCell<Power>,
}

impl<C: RegisterConnector> DaikinHeatPump<C> {
    pub fn new(connector: C, registers: DaikinRegisters) -> Self {
        Self {
            client: ResilientRegisterClient::new(connector),
            registers,
            state: ReadingCell::new(),
        }
    }
}

#[async_trait]
impl<C: RegisterConnector> Device for DaikinHeatPump<C> {
    type Reading = Power;

    async fn update(&self) -> Result<(), DeviceCommunicationError> {
        let words = self
            .client
            .read_input_registers(self.registers.power, 1)
            .await?;
        let raw = i16_from_words(&words)
            .ok_or_else(|| DeviceCommunicationError::new(self.client.host(), "empty power reply"))?;
        self.state.store(Power(i32::from(raw) * POWER_SCALE));
        Ok(())
    }

    fn state(&self) -> Option<DeviceUpdate<Power>> {
        self.state.get()
    }
}

impl<C: RegisterConnector> HeatPump for DaikinHeatPump<C> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::modbus::testing::{FakeConnector, FakeDevice};

    #[tokio::test]
    async fn scales_power_by_ten() {
        let device = FakeDevice::new();
        device.set(50, &[125]);
        let heat_pump = DaikinHeatPump::new(FakeConnector(device), DaikinRegisters::default());

        heat_pump.update().await.unwrap();

        assert_eq!(heat_pump.state().unwrap().reading, Power(1250));
    }

    #[tokio::test]
    async fn unreachable_hub_is_an_error() {
        let device = FakeDevice::new();
        device.set_unreachable(true);
        let heat_pump = DaikinHeatPump::new(FakeConnector(device), DaikinRegisters::default());

        assert!(heat_pump.update().await.is_err());
        assert!(heat_pump.state().is_none());
    }
}
