//! Process runtime.
//!
//! [`ServerHandle`] wires the device adapters, the energy manager control
//! loop, the charger keep-alive, the OCPP session manager and the
//! WebSocket listener, and stops them again on shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::application::charging::session::{OcppSessionManager, SharedSessionManager};
use crate::application::energy::{EnergyDevices, EnergyManager, ModeControl};
use crate::config::{AppConfig, ChargerKind, GridMeterKind, HeatPumpKind, SmaKind};
use crate::domain::Current;
use crate::infrastructure::devices::{
    Battery, DaikinHeatPump, P1Meter, SmaBattery, SmaSolar, Solar, WebastoCharger,
};
use crate::infrastructure::modbus::TcpConnector;
use crate::infrastructure::storage::{
    ChargingRecordStore, DiscardingRecordStore, InMemoryRecordStore,
};
use crate::interfaces::ws::OcppServer;
use crate::support::shutdown::{ShutdownCoordinator, ShutdownSignal};

type StartResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

// ── Options ────────────────────────────────────────────────────────

/// Options for starting the runtime.
#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    /// Application configuration.
    pub config: AppConfig,
    /// Start in MANUAL mode holding this current.
    pub manual_current: Option<u32>,
}

// ── ServerHandle ───────────────────────────────────────────────────

/// Handle to a running energy manager and OCPP central system.
pub struct ServerHandle {
    /// The control loop, for subscribing to the published state.
    pub energy_manager: Arc<EnergyManager>,
    /// Mode and setpoint control of the running loop.
    pub mode_control: Arc<ModeControl>,
    /// OCPP session manager, absent when `[ocpp] enabled = false`.
    pub session_manager: Option<SharedSessionManager>,
    /// The configuration the server was started with.
    pub config: AppConfig,
    /// WebSocket port actually bound (useful with port 0).
    pub ws_port: Option<u16>,

    shutdown: ShutdownCoordinator,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl ServerHandle {
    /// Start everything described by `opts.config`.
    ///
    /// This will:
    /// 1. Install the Prometheus exporter (if enabled)
    /// 2. Build the device adapters and start the charger keep-alive
    /// 3. Start the energy manager control loop
    /// 4. Start the OCPP WebSocket server (if enabled)
    pub async fn start(opts: ServerOptions) -> StartResult<Self> {
        let app_cfg = opts.config;
        app_cfg.validate()?;

        info!("Starting gridpilot...");

        if app_cfg.metrics.enabled {
            install_metrics_exporter(&app_cfg.metrics.listen)?;
        }

        let shutdown =
            ShutdownCoordinator::new(Duration::from_secs(app_cfg.server.shutdown_timeout));
        let signal = shutdown.signal();
        let mut tasks = Vec::new();

        // ── Devices ────────────────────────────────────────────
        let (devices, charger) = build_devices(&app_cfg)?;
        let keep_alive = app_cfg.energy_manager.keep_alive_interval()?;
        tasks.push((
            "charger keep-alive",
            charger.spawn_keep_alive(keep_alive, signal.clone()),
        ));

        // ── Energy manager ─────────────────────────────────────
        let settings = app_cfg.energy_manager.settings()?;
        info!(
            min = %settings.limits.min,
            max = %settings.limits.max,
            interval = ?settings.interval,
            "Energy manager configured"
        );
        let energy_manager = Arc::new(EnergyManager::new(devices, settings));
        let mode_control = energy_manager.control();
        if let Some(amps) = opts.manual_current {
            mode_control.set_manual(Current(amps));
        }

        let manager = energy_manager.clone();
        let loop_signal = signal.clone();
        tasks.push((
            "energy manager",
            tokio::spawn(async move { manager.run(loop_signal).await }),
        ));

        // ── OCPP central system ────────────────────────────────
        let (session_manager, ws_port) = if app_cfg.ocpp.enabled {
            let store: Arc<dyn ChargingRecordStore> = if app_cfg.ocpp.retain_history {
                Arc::new(InMemoryRecordStore::new())
            } else {
                Arc::new(DiscardingRecordStore)
            };
            let session_manager =
                OcppSessionManager::new(app_cfg.ocpp.heartbeat_interval, store).shared();

            let listener = TcpListener::bind(app_cfg.server.ws_address()).await?;
            let ws_port = listener.local_addr()?.port();

            let server = OcppServer::new(app_cfg.server.ws_address(), session_manager.clone())
                .with_shutdown(signal.clone());
            tasks.push((
                "WebSocket server",
                tokio::spawn(async move {
                    if let Err(e) = server.run_on(listener).await {
                        error!("WebSocket server error: {}", e);
                    }
                }),
            ));

            (Some(session_manager), Some(ws_port))
        } else {
            info!("OCPP central system disabled");
            (None, None)
        };

        Ok(Self {
            energy_manager,
            mode_control,
            session_manager,
            config: app_cfg,
            ws_port,
            shutdown,
            tasks,
        })
    }

    /// Get a cloneable shutdown signal.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.signal()
    }

    /// Install OS signal listeners (SIGTERM, SIGINT) that trigger shutdown.
    pub fn install_signal_handler(&self) {
        self.shutdown.start_signal_listener();
    }

    /// Trigger graceful shutdown (non-blocking).
    ///
    /// Call [`ServerHandle::wait`] to block until everything has stopped.
    pub fn trigger_shutdown(&self) {
        self.shutdown.signal().trigger();
    }

    /// Wait for the shutdown signal, then for every task to stop within
    /// the configured timeout. Tasks still running after that are aborted.
    pub async fn wait(self) {
        let Self {
            shutdown, tasks, ..
        } = self;

        let aborts: Vec<_> = tasks.iter().map(|(_, task)| task.abort_handle()).collect();

        let completed = shutdown
            .shutdown_with_cleanup(|| async move {
                for (name, task) in tasks {
                    match task.await {
                        Ok(()) => info!("{} stopped", name),
                        Err(e) => error!("{} task failed: {}", name, e),
                    }
                }
            })
            .await;

        if !completed {
            warn!("Aborting tasks that did not stop in time");
            for abort in aborts {
                abort.abort();
            }
        }

        info!("👋 gridpilot shutdown complete");
    }

    /// Trigger shutdown and wait for completion.
    pub async fn shutdown(self) {
        info!("🛑 Shutting down...");
        self.trigger_shutdown();
        self.wait().await;
    }

    /// Check if any task is still running.
    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|(_, task)| !task.is_finished())
    }
}

// ── Helpers ────────────────────────────────────────────────────────

fn install_metrics_exporter(listen: &str) -> StartResult<()> {
    let addr: SocketAddr = listen.parse()?;
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => info!("📊 Prometheus metrics on http://{}/metrics", addr),
        // The global recorder can only be installed once per process.
        Err(e) => warn!("Prometheus exporter not installed: {}", e),
    }
    Ok(())
}

/// Build the configured adapters. The charger is also returned on its own
/// so its keep-alive task can be started.
fn build_devices(
    config: &AppConfig,
) -> StartResult<(EnergyDevices, Arc<WebastoCharger<TcpConnector>>)> {
    let devices = &config.devices;
    let energy = &config.energy_manager;
    let modbus = |host: String, unit_id: u8| {
        TcpConnector::new(
            host,
            devices.modbus_port,
            unit_id,
            devices.connect_timeout(),
            devices.io_timeout(),
        )
    };

    let grid = match devices.grid {
        GridMeterKind::P1 => Arc::new(P1Meter::new(
            energy.grid_meter_host(),
            devices.io_timeout(),
        )?),
    };

    let charger = match devices.charger {
        ChargerKind::Webasto => Arc::new(WebastoCharger::new(
            modbus(energy.charger_host(), devices.webasto.unit_id),
            devices.webasto,
        )),
    };

    let heat_pump = match devices.heat_pump {
        HeatPumpKind::Daikin => Arc::new(DaikinHeatPump::new(
            modbus(energy.heat_pump_host(), devices.daikin.unit_id),
            devices.daikin,
        )),
    };

    let solar = energy.solar_host().map(|host| match devices.solar {
        SmaKind::Sma => Arc::new(SmaSolar::new(
            modbus(host, devices.sma_solar.unit_id),
            devices.sma_solar,
        )) as Arc<dyn Solar>,
    });

    let battery = energy.battery_host().map(|host| match devices.battery {
        SmaKind::Sma => Arc::new(SmaBattery::new(
            modbus(host, devices.sma_battery.unit_id),
            devices.sma_battery,
        )) as Arc<dyn Battery>,
    });

    info!(
        grid = %energy.grid_meter_host(),
        charger = %energy.charger_host(),
        heat_pump = %energy.heat_pump_host(),
        solar = solar.is_some(),
        battery = battery.is_some(),
        "Devices configured"
    );

    let devices = EnergyDevices {
        grid,
        charger: charger.clone(),
        heat_pump,
        solar,
        battery,
    };
    Ok((devices, charger))
}

/// Initialize tracing (logging) from the application config.
///
/// Call this once at process startup (before [`ServerHandle::start`]).
pub fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    match config.logging.format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnergyManagerConfig;
    use crate::domain::Mode;

    fn local_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.server.ws_host = "127.0.0.1".into();
        config.server.ws_port = 0;
        config.server.shutdown_timeout = 2;
        config.devices.modbus_port = 1;
        config.devices.connect_timeout = 1;
        config.devices.io_timeout = 1;
        config.energy_manager = EnergyManagerConfig::from_pairs([
            ("gridmeter", "127.0.0.1:1"),
            ("charger", "127.0.0.1"),
            ("heatpump", "127.0.0.1"),
        ]);
        config
    }

    #[tokio::test]
    async fn starts_and_stops() {
        let handle = ServerHandle::start(ServerOptions {
            config: local_config(),
            manual_current: Some(10),
        })
        .await
        .unwrap();

        assert!(handle.ws_port.is_some_and(|port| port != 0));
        assert!(handle.session_manager.is_some());
        assert_eq!(handle.mode_control.mode(), Mode::Manual);
        assert!(handle.is_running());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn ocpp_can_be_disabled() {
        let mut config = local_config();
        config.ocpp.enabled = false;

        let handle = ServerHandle::start(ServerOptions {
            config,
            manual_current: None,
        })
        .await
        .unwrap();

        assert!(handle.session_manager.is_none());
        assert_eq!(handle.ws_port, None);
        handle.shutdown().await;
    }
}
