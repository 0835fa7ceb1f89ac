//! Register-protocol (Modbus/TCP) access to devices

mod client;
mod tcp;
pub mod words;

pub use client::{
    RegisterConnector, RegisterOperation, RegisterSession, ResilientRegisterClient,
};
pub use tcp::{TcpConnector, TcpSession};

#[cfg(test)]
pub(crate) use client::testing;
