//! # gridpilot
//!
//! Home energy manager with an embedded OCPP 1.6J central system.
//!
//! ## Architecture
//!
//! The project follows Clean Architecture principles:
//!
//! - **domain**: Measurement types, energy state, charge point model, errors
//! - **application**: Energy manager control loop, OCPP session manager and router
//! - **infrastructure**: Modbus client, device adapters, charging-record storage
//! - **interfaces**: OCPP WebSocket server
//! - **support**: OCPP-J framing, shutdown coordination

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;
pub mod server;
pub mod support;

pub use config::{default_config_path, AppConfig, ConfigError};
pub use server::{init_tracing, ServerHandle, ServerOptions};
