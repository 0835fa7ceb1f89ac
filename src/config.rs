//! Configuration module
//!
//! Loaded from a TOML file, `~/.config/gridpilot/config.toml` by default.
//! Every section is optional; omitted keys take their defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::application::energy::{CurrentLimits, EnergyManagerSettings};
use crate::application::charging::session::DEFAULT_HEARTBEAT_INTERVAL;
use crate::domain::Current;
use crate::infrastructure::devices::{
    DaikinRegisters, SmaBatteryRegisters, SmaSolarRegisters, WebastoRegisters,
};

/// Host used when a device address is not configured. Nothing listens
/// there, so the device simply reads as unavailable.
pub const UNREACHABLE_HOST: &str = "0.0.0.0";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Default config location: `<config_dir>/gridpilot/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gridpilot")
        .join("config.toml")
}

// ── AppConfig ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
    pub ocpp: OcppConfig,
    pub energy_manager: EnergyManagerConfig,
    pub devices: DevicesConfig,
}

impl AppConfig {
    /// Load and validate the file at `path`. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No config file at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.energy_manager.settings()?;
        self.energy_manager.keep_alive_interval()?;
        if self.ocpp.heartbeat_interval == 0 {
            return Err(ConfigError::Invalid(format!(
                "ocpp.heartbeat_interval must be positive, got {}",
                self.ocpp.heartbeat_interval
            )));
        }
        Ok(())
    }
}

// ── Sections ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub ws_host: String,
    pub ws_port: u16,
    /// Seconds to wait for tasks to stop on shutdown
    pub shutdown_timeout: u64,
}

impl ServerConfig {
    pub fn ws_address(&self) -> String {
        format!("{}:{}", self.ws_host, self.ws_port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ws_host: "0.0.0.0".to_string(),
            ws_port: 9000,
            shutdown_timeout: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `trace`, `debug`, `info`, `warn`, `error` or any `EnvFilter` directive
    pub level: String,
    /// `text` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Prometheus scrape endpoint
    pub listen: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: "0.0.0.0:9100".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcppConfig {
    pub enabled: bool,
    /// Seconds, returned in BootNotification
    pub heartbeat_interval: u32,
    /// Keep finished transactions and meter values in memory
    pub retain_history: bool,
}

impl Default for OcppConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            retain_history: false,
        }
    }
}

// ── [energy_manager] ───────────────────────────────────────────

/// Flat key/value section read by the control loop.
///
/// Values may be written as strings or numbers. Legacy key names
/// (`P1meter`, `webasto`, `daikinHomeHub`) are still understood.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnergyManagerConfig(BTreeMap<String, toml::Value>);

impl EnergyManagerConfig {
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), toml::Value::String(v.to_string())))
                .collect(),
        )
    }

    fn value(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .find_map(|key| self.0.get(*key))
            .map(|value| match value {
                toml::Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
    }

    fn host(&self, keys: &[&str]) -> String {
        self.value(keys)
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| UNREACHABLE_HOST.to_string())
    }

    fn number(&self, key: &str, default: u64) -> Result<u64, ConfigError> {
        match self.value(&[key]) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|_| {
                ConfigError::Invalid(format!("energy_manager.{} is not a number: {:?}", key, raw))
            }),
        }
    }

    pub fn grid_meter_host(&self) -> String {
        self.host(&["gridmeter", "P1meter"])
    }

    pub fn charger_host(&self) -> String {
        self.host(&["charger", "webasto"])
    }

    pub fn heat_pump_host(&self) -> String {
        self.host(&["heatpump", "daikinHomeHub"])
    }

    /// `None` disables the solar adapter.
    pub fn solar_host(&self) -> Option<String> {
        self.value(&["solar"]).filter(|h| !h.is_empty())
    }

    /// `None` disables the battery adapter.
    pub fn battery_host(&self) -> Option<String> {
        self.value(&["battery"]).filter(|h| !h.is_empty())
    }

    pub fn limits(&self) -> Result<CurrentLimits, ConfigError> {
        let max = self.number("maxcurrent", 32)?;
        let min = self.number("mincurrent", 6)?;
        if min > max {
            return Err(ConfigError::Invalid(format!(
                "energy_manager.mincurrent ({}) exceeds maxcurrent ({})",
                min, max
            )));
        }
        let amps = |value: u64| {
            u32::try_from(value)
                .map(Current)
                .map_err(|_| ConfigError::Invalid(format!("current {} out of range", value)))
        };
        Ok(CurrentLimits {
            min: amps(min)?,
            max: amps(max)?,
        })
    }

    pub fn interval(&self) -> Result<Duration, ConfigError> {
        positive_seconds("interval", self.number("interval", 5)?)
    }

    pub fn keep_alive_interval(&self) -> Result<Duration, ConfigError> {
        positive_seconds("keepalive", self.number("keepalive", 10)?)
    }

    pub fn settings(&self) -> Result<EnergyManagerSettings, ConfigError> {
        Ok(EnergyManagerSettings {
            limits: self.limits()?,
            interval: self.interval()?,
        })
    }
}

fn positive_seconds(key: &str, seconds: u64) -> Result<Duration, ConfigError> {
    if seconds == 0 {
        return Err(ConfigError::Invalid(format!(
            "energy_manager.{} must be at least 1 second",
            key
        )));
    }
    Ok(Duration::from_secs(seconds))
}

// ── [devices] ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridMeterKind {
    #[default]
    P1,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargerKind {
    #[default]
    Webasto,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeatPumpKind {
    #[default]
    Daikin,
}

/// Vendor of the solar inverter and of the battery
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmaKind {
    #[default]
    Sma,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DevicesConfig {
    pub grid: GridMeterKind,
    pub charger: ChargerKind,
    pub heat_pump: HeatPumpKind,
    pub solar: SmaKind,
    pub battery: SmaKind,
    pub modbus_port: u16,
    /// Seconds
    pub connect_timeout: u64,
    /// Seconds, per register request and per meter HTTP request
    pub io_timeout: u64,
    pub webasto: WebastoRegisters,
    pub daikin: DaikinRegisters,
    pub sma_solar: SmaSolarRegisters,
    pub sma_battery: SmaBatteryRegisters,
}

impl DevicesConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout)
    }
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            grid: GridMeterKind::default(),
            charger: ChargerKind::default(),
            heat_pump: HeatPumpKind::default(),
            solar: SmaKind::default(),
            battery: SmaKind::default(),
            modbus_port: 502,
            connect_timeout: 5,
            io_timeout: 5,
            webasto: WebastoRegisters::default(),
            daikin: DaikinRegisters::default(),
            sma_solar: SmaSolarRegisters::default(),
            sma_battery: SmaBatteryRegisters::default(),
        }
    }
}
