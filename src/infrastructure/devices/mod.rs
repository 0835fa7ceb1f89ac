//! Device adapters
//!
//! One capability trait per device category. Each configured category is
//! backed by exactly one closed-set implementation chosen from the config.

mod battery;
mod charger;
mod grid_meter;
mod heat_pump;
mod solar;

pub use battery::{SmaBattery, SmaBatteryRegisters};
pub use charger::{WebastoCharger, WebastoRegisters};
pub use grid_meter::P1Meter;
pub use heat_pump::{DaikinHeatPump, DaikinRegisters};
pub use solar::{SmaSolar, SmaSolarRegisters};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::domain::{
    BatteryReading, Current, DeviceCommunicationError, DeviceUpdate, GridReading, Power,
};

/// Poll-and-cache contract shared by every adapter.
#[async_trait]
pub trait Device: Send + Sync {
    type Reading: Clone + Send + Sync;

    /// One round of polling. Updates the cached reading on success.
    async fn update(&self) -> Result<(), DeviceCommunicationError>;

    /// Last successful reading, without touching the device.
    fn state(&self) -> Option<DeviceUpdate<Self::Reading>>;
}

pub trait GridMeter: Device<Reading = GridReading> {}

#[async_trait]
pub trait Charger: Device<Reading = Power> {
    async fn set_max_current(&self, current: Current) -> Result<(), DeviceCommunicationError>;
}

pub trait HeatPump: Device<Reading = Power> {}

pub trait Solar: Device<Reading = Power> {}

#[async_trait]
pub trait Battery: Device<Reading = BatteryReading> {
    /// Positive charges, negative discharges.
    async fn set_charging_power(&self, power: Power) -> Result<(), DeviceCommunicationError>;
}

/// Latest-value cache readable without blocking.
pub(crate) struct ReadingCell<T> {
    value: watch::Sender<Option<DeviceUpdate<T>>>,
}

impl<T: Clone> ReadingCell<T> {
    pub fn new() -> Self {
        let (value, _) = watch::channel(None);
        Self { value }
    }

    pub fn store(&self, reading: T) {
        self.value.send_replace(Some(DeviceUpdate::now(reading)));
    }

    pub fn clear(&self) {
        self.value.send_replace(None);
    }

    pub fn get(&self) -> Option<DeviceUpdate<T>> {
        self.value.borrow().clone()
    }
}

impl<T: Clone> Default for ReadingCell<T> {
    fn default() -> Self {
        Self::new()
    }
}
