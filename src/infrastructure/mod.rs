//! Infrastructure layer - device protocols and storage

pub mod devices;
pub mod modbus;
pub mod storage;
