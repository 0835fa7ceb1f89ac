//! WebSocket interfaces
//!
//! - `ocpp_server`: OCPP 1.6J central system endpoint

pub mod ocpp_server;

pub use ocpp_server::OcppServer;
