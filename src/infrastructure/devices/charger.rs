//! Webasto wallbox over Modbus/TCP

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{Charger, Device, ReadingCell};
use crate::domain::{Current, DeviceCommunicationError, DeviceUpdate, Power};
use crate::infrastructure::modbus::words::i32_from_words;
use crate::infrastructure::modbus::{RegisterConnector, ResilientRegisterClient, TcpConnector};
use crate::support::shutdown::ShutdownSignal;

/// Register map of the Webasto Live/Unite Modbus interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebastoRegisters {
    pub unit_id: u8,
    /// Input register pair, total active power (W), signed 32-bit.
    pub total_power: u16,
    /// Holding register, maximum charging current (A).
    pub max_current: u16,
    /// Holding register the charger expects a `1` in periodically.
    pub keep_alive: u16,
}

impl Default for WebastoRegisters {
    fn default() -> Self {
        Self {
            unit_id: 1,
            total_power: 1020,
            max_current: 5004,
            keep_alive: 6000,
        }
    }
}

pub struct WebastoCharger<C: RegisterConnector = TcpConnector> {
    client: ResilientRegisterClient<C>,
    registers: WebastoRegisters,
    state: ReadingCell<Power>,
}

impl<C: RegisterConnector> WebastoCharger<C> {
    pub fn new(connector: C, registers: WebastoRegisters) -> Self {
        Self {
            client: ResilientRegisterClient::new(connector),
            registers,
            state: ReadingCell::new(),
        }
    }

    pub fn client(&self) -> &ResilientRegisterClient<C> {
        &self.client
    }

    /// Single keep-alive write.
    pub async fn keep_alive(&self) -> Result<(), DeviceCommunicationError> {
        self.client
            .write_single_register(self.registers.keep_alive, 1)
            .await
    }
}

impl<C: RegisterConnector + 'static> WebastoCharger<C> {
    /// Start the keep-alive task: writes the keep-alive register every
    /// `interval`, independent of the control loop, until shutdown.
    pub fn spawn_keep_alive(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: ShutdownSignal,
    ) -> JoinHandle<()> {
        let charger = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(host = charger.client.host(), ?interval, "Charger keep-alive started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match charger.keep_alive().await {
                            Ok(()) => debug!(host = charger.client.host(), "Keep-alive written"),
                            Err(e) => warn!(error = %e, "Charger keep-alive failed"),
                        }
                    }
                    _ = shutdown.wait() => break,
                }
            }

            info!(host = charger.client.host(), "Charger keep-alive stopped");
        })
    }
}

#[async_trait]
impl<C: RegisterConnector> Device for WebastoCharger<C> {
    type Reading = Power;

    async fn update(&self) -> Result<(), DeviceCommunicationError> {
        let words = self
            .client
            .read_input_registers(self.registers.total_power, 2)
            .await?;
        let watts = i32_from_words(&words).ok_or_else(|| {
            DeviceCommunicationError::new(self.client.host(), "short total power reply")
        })?;
        self.state.store(Power(watts));
        Ok(())
    }

    fn state(&self) -> Option<DeviceUpdate<Power>> {
        self.state.get()
    }
}

#[async_trait]
impl<C: RegisterConnector> Charger for WebastoCharger<C> {
    async fn set_max_current(&self, current: Current) -> Result<(), DeviceCommunicationError> {
        let amps = u16::try_from(current.amps()).unwrap_or(u16::MAX);
        self.client
            .write_single_register(self.registers.max_current, amps)
            .await
    }
}
