//! SMA Sunny Boy / Tripower inverter

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Device, ReadingCell, Solar};
use crate::domain::{DeviceCommunicationError, DeviceUpdate, Power};
use crate::infrastructure::modbus::words::i32_from_words;
use crate::infrastructure::modbus::{RegisterConnector, ResilientRegisterClient, TcpConnector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmaSolarRegisters {
    pub unit_id: u8,
    /// Input register pair, total AC power (W), signed 32-bit.
    pub power: u16,
}

impl Default for SmaSolarRegisters {
    fn default() -> Self {
        Self {
            unit_id: 3,
            power: 30775,
        }
    }
}

pub struct SmaSolar<C: RegisterConnector = TcpConnector> {
    client: ResilientRegisterClient<C>,
    registers: SmaSolarRegisters,
    state: ReadingCell<Power>,
}

impl<C: RegisterConnector> SmaSolar<C> {
    pub fn new(connector: C, registers: SmaSolarRegisters) -> Self {
        Self {
            client: ResilientRegisterClient::new(connector),
            registers,
            state: ReadingCell::new(),
        }
    }
}

#[async_trait]
impl<C: RegisterConnector> Device for SmaSolar<C> {
    type Reading = Power;

    async fn update(&self) -> Result<(), DeviceCommunicationError> {
        let words = self
            .client
            .read_input_registers(self.registers.power, 2)
            .await?;
        let watts = i32_from_words(&words)
            .ok_or_else(|| DeviceCommunicationError::new(self.client.host(), "short power reply"))?;
        // An idle inverter reports NaN (i32::MIN).
        self.state.store(Power(watts.max(0)));
        Ok(())
    }

    fn state(&self) -> Option<DeviceUpdate<Power>> {
        self.state.get()
    }
}

impl<C: RegisterConnector> Solar for SmaSolar<C> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::modbus::testing::{FakeConnector, FakeDevice};
    use crate::infrastructure::modbus::words::i32_to_words;

    async fn read(words: [u16; 2]) -> Power {
        let device = FakeDevice::new();
        device.set(30775, &words);
        let solar = SmaSolar::new(FakeConnector(device), SmaSolarRegisters::default());
        solar.update().await.unwrap();
        solar.state().unwrap().reading
    }

    #[tokio::test]
    async fn reports_production() {
        assert_eq!(read(i32_to_words(4200)).await, Power(4200));
    }

    #[tokio::test]
    async fn nan_and_negative_read_as_zero() {
        assert_eq!(read([0x8000, 0x0000]).await, Power(0));
        assert_eq!(read(i32_to_words(-5)).await, Power(0));
    }
}
