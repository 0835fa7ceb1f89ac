//! Energy manager control loop
//!
//! Every cycle: poll the devices one after another, assemble a
//! [`CombinedState`], derive the charger setpoint, command the charger,
//! publish the state and sleep.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::control::{CurrentLimits, ModeControl};
use crate::domain::{CombinedState, Current, Mode};
use crate::infrastructure::devices::{Battery, Charger, Device, GridMeter, HeatPump, Solar};
use crate::support::shutdown::ShutdownSignal;

/// Devices polled by the control loop.
#[derive(Clone)]
pub struct EnergyDevices {
    pub grid: Arc<dyn GridMeter>,
    pub charger: Arc<dyn Charger>,
    pub heat_pump: Arc<dyn HeatPump>,
    pub solar: Option<Arc<dyn Solar>>,
    pub battery: Option<Arc<dyn Battery>>,
}

#[derive(Debug, Clone, Copy)]
pub struct EnergyManagerSettings {
    pub limits: CurrentLimits,
    pub interval: Duration,
}

impl Default for EnergyManagerSettings {
    fn default() -> Self {
        Self {
            limits: CurrentLimits::default(),
            interval: Duration::from_secs(5),
        }
    }
}

/// Charger setpoint for one cycle.
///
/// MANUAL holds `held`. AUTO needs grid power, grid voltage and charger
/// power; without all three the result is zero. Available power is
/// `charger - grid`; a positive value is converted to amps, clamped to the
/// limits and only then rounded, otherwise the minimum current is used.
/// A zero voltage makes the raw current infinite, which clamps to the
/// maximum.
pub fn compute_setpoint(
    mode: Mode,
    held: Current,
    state: &CombinedState,
    limits: CurrentLimits,
) -> Current {
    if mode == Mode::Manual {
        return held;
    }

    let (Some(grid), Some(voltage), Some(charger)) =
        (state.grid_power, state.grid_voltage, state.charger_power)
    else {
        return Current::ZERO;
    };
    let available = i64::from(charger.watts()) - i64::from(grid.watts());
    if available <= 0 {
        return limits.min;
    }

    let raw = available as f64 / f64::from(voltage.volts());
    let clamped = raw
        .min(f64::from(limits.max.amps()))
        .max(f64::from(limits.min.amps()));
    Current(clamped.round() as u32)
}

pub struct EnergyManager {
    devices: EnergyDevices,
    settings: EnergyManagerSettings,
    control: Arc<ModeControl>,
    state: watch::Sender<CombinedState>,
}

impl EnergyManager {
    pub fn new(devices: EnergyDevices, settings: EnergyManagerSettings) -> Self {
        let (state, _) = watch::channel(CombinedState::empty());
        Self {
            devices,
            settings,
            control: Arc::new(ModeControl::new(settings.limits)),
            state,
        }
    }

    pub fn control(&self) -> Arc<ModeControl> {
        self.control.clone()
    }

    /// Latest-value subscription; the current snapshot is visible right away.
    pub fn subscribe(&self) -> watch::Receiver<CombinedState> {
        self.state.subscribe()
    }

    pub fn latest(&self) -> CombinedState {
        self.state.borrow().clone()
    }

    /// Poll every device once. A failing device only blanks its own fields.
    pub async fn poll(&self) -> CombinedState {
        let mut state = CombinedState::empty()
            .with_grid(poll_device("grid", &*self.devices.grid).await);
        state.charger_power = poll_device("charger", &*self.devices.charger).await;
        state.heat_pump_power = poll_device("heat_pump", &*self.devices.heat_pump).await;

        if let Some(solar) = &self.devices.solar {
            state.solar_power = poll_device("solar", &**solar).await;
        }
        if let Some(battery) = &self.devices.battery {
            state = state.with_battery(poll_device("battery", &**battery).await);
        }

        state
    }

    /// One full control cycle. Returns the commanded setpoint.
    pub async fn run_cycle(&self) -> Current {
        let state = self.poll().await;
        let mode = self.control.mode();
        let setpoint = compute_setpoint(mode, self.control.setpoint(), &state, self.settings.limits);

        info!(
            %mode,
            grid_power = ?state.grid_power,
            grid_voltage = ?state.grid_voltage,
            charger_power = ?state.charger_power,
            setpoint = setpoint.amps(),
            "Energy manager cycle"
        );

        self.control.record_setpoint(setpoint);
        if let Err(e) = self.devices.charger.set_max_current(setpoint).await {
            warn!(error = %e, setpoint = setpoint.amps(), "Failed to command charger");
        }

        metrics::gauge!("charger_setpoint_amps").set(f64::from(setpoint.amps()));
        metrics::counter!("energy_manager_cycles_total", "mode" => mode.to_string()).increment(1);

        self.state.send_replace(state);
        setpoint
    }

    /// Run cycles until shutdown.
    pub async fn run(&self, shutdown: ShutdownSignal) {
        info!(interval = ?self.settings.interval, "Energy manager started");

        loop {
            self.run_cycle().await;

            tokio::select! {
                _ = tokio::time::sleep(self.settings.interval) => {}
                _ = shutdown.wait() => break,
            }
        }

        info!("Energy manager stopped");
    }
}

async fn poll_device<D>(name: &'static str, device: &D) -> Option<D::Reading>
where
    D: Device + ?Sized,
{
    match device.update().await {
        Ok(()) => {
            let reading = device.state().map(|update| update.reading);
            if reading.is_none() {
                debug!(device = name, "No reading available");
            }
            reading
        }
        Err(e) => {
            warn!(device = name, error = %e, "Device poll failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::domain::{
        BatteryReading, DeviceCommunicationError, DeviceUpdate, Energy, GridReading, Power,
        Voltage,
    };

    /// Device whose next poll result is set by the test.
    struct Fake<R> {
        next: Mutex<Option<R>>,
        last: Mutex<Option<DeviceUpdate<R>>>,
        commands: Mutex<Vec<Current>>,
    }

    impl<R: Clone> Fake<R> {
        fn new(next: Option<R>) -> Arc<Self> {
            Arc::new(Self {
                next: Mutex::new(next),
                last: Mutex::new(None),
                commands: Mutex::new(Vec::new()),
            })
        }

        fn set(&self, next: Option<R>) {
            *self.next.lock().unwrap() = next;
        }

        fn commands(&self) -> Vec<Current> {
            self.commands.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl<R: Clone + Send + Sync + 'static> Device for Fake<R> {
        type Reading = R;

        async fn update(&self) -> Result<(), DeviceCommunicationError> {
            let next = self.next.lock().unwrap().clone();
            match next {
                Some(reading) => {
                    *self.last.lock().unwrap() = Some(DeviceUpdate::now(reading));
                    Ok(())
                }
                None => Err(DeviceCommunicationError::new("fake", "unreachable")),
            }
        }

        fn state(&self) -> Option<DeviceUpdate<R>> {
            self.last.lock().unwrap().clone()
        }
    }

    impl GridMeter for Fake<GridReading> {}
    impl HeatPump for Fake<Power> {}
    impl Solar for Fake<Power> {}

    #[async_trait]
    impl Charger for Fake<Power> {
        async fn set_max_current(&self, current: Current) -> Result<(), DeviceCommunicationError> {
            self.commands.lock().unwrap().push(current);
            Ok(())
        }
    }

    #[async_trait]
    impl Battery for Fake<BatteryReading> {
        async fn set_charging_power(&self, _power: Power) -> Result<(), DeviceCommunicationError> {
            Ok(())
        }
    }

    fn state(grid: Option<i32>, voltage: Option<u32>, charger: Option<i32>) -> CombinedState {
        let mut state = CombinedState::empty();
        state.grid_power = grid.map(Power);
        state.grid_voltage = voltage.map(Voltage);
        state.charger_power = charger.map(Power);
        state
    }

    fn auto(state: &CombinedState) -> Current {
        compute_setpoint(Mode::Auto, Current(0), state, CurrentLimits::default())
    }

    #[test]
    fn allocation_formula() {
        // 2500 W / 230 V = 10.87 A
        assert_eq!(auto(&state(Some(500), Some(230), Some(3000))), Current(11));
    }

    #[test]
    fn no_headroom_uses_floor() {
        assert_eq!(auto(&state(Some(4000), Some(230), Some(3000))), Current(6));
        assert_eq!(auto(&state(Some(3000), Some(230), Some(3000))), Current(6));
    }

    #[test]
    fn large_headroom_hits_ceiling() {
        assert_eq!(auto(&state(Some(0), Some(230), Some(10000))), Current(32));
    }

    #[test]
    fn small_headroom_clamped_up_to_floor() {
        // 230 W / 230 V = 1 A, below the 6 A floor
        assert_eq!(auto(&state(Some(0), Some(230), Some(230))), Current(6));
    }

    #[test]
    fn clamps_before_rounding() {
        let limits = CurrentLimits {
            min: Current(6),
            max: Current(10),
        };
        // 2415 W / 230 V = 10.5 A: clamped to 10 first, so no round-up to 11
        let s = state(Some(0), Some(230), Some(2415));
        assert_eq!(compute_setpoint(Mode::Auto, Current(0), &s, limits), Current(10));
        // 1495 W / 230 V = 6.5 A rounds half up
        let s = state(Some(0), Some(230), Some(1495));
        assert_eq!(compute_setpoint(Mode::Auto, Current(0), &s, limits), Current(7));
    }

    #[test]
    fn export_counts_as_headroom() {
        // exporting 1150 W while the charger idles: 1150 / 230 = 5 A, floor 6
        assert_eq!(auto(&state(Some(-1150), Some(230), Some(0))), Current(6));
        // exporting 2300 W on top of 2300 W charging: 20 A
        assert_eq!(auto(&state(Some(-2300), Some(230), Some(2300))), Current(20));
    }

    #[test]
    fn missing_reading_is_fail_safe() {
        assert_eq!(auto(&state(None, Some(230), Some(3000))), Current::ZERO);
        assert_eq!(auto(&state(Some(500), None, Some(3000))), Current::ZERO);
        assert_eq!(auto(&state(Some(500), Some(230), None)), Current::ZERO);

        let mut other_fields = state(Some(-5000), None, Some(9000));
        other_fields.heat_pump_power = Some(Power(800));
        other_fields.solar_power = Some(Power(6000));
        assert_eq!(auto(&other_fields), Current::ZERO);
    }

    #[test]
    fn zero_voltage_follows_the_division() {
        // 2500 W / 0 V is unbounded: clamped to the maximum
        assert_eq!(auto(&state(Some(500), Some(0), Some(3000))), Current(32));
        // nothing available: the floor, as with any other voltage
        assert_eq!(auto(&state(Some(3000), Some(0), Some(500))), Current(6));
    }

    #[test]
    fn manual_holds_value() {
        let s = state(Some(500), Some(230), Some(3000));
        assert_eq!(
            compute_setpoint(Mode::Manual, Current(16), &s, CurrentLimits::default()),
            Current(16)
        );
    }

    struct Rig {
        grid: Arc<Fake<GridReading>>,
        charger: Arc<Fake<Power>>,
        heat_pump: Arc<Fake<Power>>,
        manager: EnergyManager,
    }

    fn rig() -> Rig {
        let grid = Fake::new(Some(GridReading {
            power: Power(500),
            voltage: Voltage(230),
        }));
        let charger = Fake::new(Some(Power(3000)));
        let heat_pump = Fake::new(Some(Power(1200)));
        let devices = EnergyDevices {
            grid: grid.clone(),
            charger: charger.clone(),
            heat_pump: heat_pump.clone(),
            solar: None,
            battery: None,
        };
        let settings = EnergyManagerSettings {
            interval: Duration::from_millis(10),
            ..Default::default()
        };
        Rig {
            grid,
            charger,
            heat_pump,
            manager: EnergyManager::new(devices, settings),
        }
    }

    #[tokio::test]
    async fn cycle_commands_charger_and_publishes() {
        let rig = rig();
        let mut updates = rig.manager.subscribe();

        let setpoint = rig.manager.run_cycle().await;

        assert_eq!(setpoint, Current(11));
        assert_eq!(rig.charger.commands(), vec![Current(11)]);
        assert!(updates.has_changed().unwrap());
        let published = updates.borrow_and_update().clone();
        assert_eq!(published.grid_power, Some(Power(500)));
        assert_eq!(published.heat_pump_power, Some(Power(1200)));
        assert_eq!(published.solar_power, None);
    }

    #[tokio::test]
    async fn failing_device_only_blanks_its_field() {
        let rig = rig();
        rig.manager.run_cycle().await;

        rig.heat_pump.set(None);
        rig.manager.run_cycle().await;
        let state = rig.manager.latest();
        assert_eq!(state.heat_pump_power, None);
        assert_eq!(state.charger_power, Some(Power(3000)));

        // a failed charger poll does not fall back to its cached reading
        rig.charger.set(None);
        assert_eq!(rig.manager.run_cycle().await, Current::ZERO);
        assert_eq!(rig.manager.latest().charger_power, None);
        assert_eq!(rig.charger.commands().last(), Some(&Current::ZERO));
    }

    #[tokio::test]
    async fn manual_mode_is_idempotent() {
        let rig = rig();
        rig.manager.control().set_manual(Current(16));

        for round in 0..5 {
            if round % 2 == 0 {
                rig.grid.set(None);
                rig.charger.set(None);
            } else {
                rig.grid.set(Some(GridReading {
                    power: Power(9000),
                    voltage: Voltage(230),
                }));
                rig.charger.set(Some(Power(0)));
            }
            assert_eq!(rig.manager.run_cycle().await, Current(16));
            assert_eq!(rig.manager.control().setpoint(), Current(16));
        }
        assert!(rig.charger.commands().iter().all(|c| *c == Current(16)));
    }

    #[tokio::test]
    async fn optional_devices_fill_their_fields() {
        let rig = rig();
        let solar = Fake::new(Some(Power(4200)));
        let battery = Fake::new(Some(BatteryReading {
            power: Power(-800),
            state_of_charge: 71,
            lifetime_charged: Energy(10_000),
        }));
        let mut devices = rig.manager.devices.clone();
        devices.solar = Some(solar as Arc<dyn Solar>);
        devices.battery = Some(battery as Arc<dyn Battery>);
        let manager = EnergyManager::new(devices, EnergyManagerSettings::default());

        let state = manager.poll().await;

        assert_eq!(state.solar_power, Some(Power(4200)));
        assert_eq!(state.battery_power, Some(Power(-800)));
        assert_eq!(state.battery_charge, Some(71));
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let rig = rig();
        let manager = Arc::new(rig.manager);
        let shutdown = ShutdownSignal::new();
        let mut updates = manager.subscribe();

        let task = {
            let manager = manager.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { manager.run(shutdown).await })
        };

        updates.changed().await.unwrap();
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(!rig.charger.commands().is_empty());
    }
}
