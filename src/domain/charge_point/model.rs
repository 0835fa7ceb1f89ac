//! Charge point domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connector status as reported by the charge point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectorStatus {
    #[default]
    Available,
    Preparing,
    Charging,
    SuspendedEVSE,
    SuspendedEV,
    Finishing,
    Reserved,
    Unavailable,
    Faulted,
}

impl std::fmt::Display for ConnectorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Available => "Available",
            Self::Preparing => "Preparing",
            Self::Charging => "Charging",
            Self::SuspendedEVSE => "SuspendedEVSE",
            Self::SuspendedEV => "SuspendedEV",
            Self::Finishing => "Finishing",
            Self::Reserved => "Reserved",
            Self::Unavailable => "Unavailable",
            Self::Faulted => "Faulted",
        };
        f.write_str(s)
    }
}

/// Boot registration state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegistrationStatus {
    /// No BootNotification received yet.
    #[default]
    Pending,
    Accepted,
}

/// Result of an outbound command. Reflects delivery only, not what the
/// charge point decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Accepted,
}

/// State of one connector on a charge point
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorState {
    pub connector_id: u32,
    pub status: ConnectorStatus,
    /// Last reported OCPP error code, `NoError` until told otherwise.
    pub error_code: String,
    pub last_status_update: DateTime<Utc>,
    pub current_transaction_id: Option<i32>,
}

impl ConnectorState {
    pub fn new(connector_id: u32) -> Self {
        Self {
            connector_id,
            status: ConnectorStatus::default(),
            error_code: "NoError".to_string(),
            last_status_update: Utc::now(),
            current_transaction_id: None,
        }
    }

    pub fn begin_transaction(&mut self, transaction_id: i32) {
        self.current_transaction_id = Some(transaction_id);
        self.status = ConnectorStatus::Charging;
        self.last_status_update = Utc::now();
    }

    pub fn end_transaction(&mut self) {
        self.current_transaction_id = None;
        self.status = ConnectorStatus::Available;
        self.last_status_update = Utc::now();
    }

    pub fn report(&mut self, status: ConnectorStatus, error_code: impl Into<String>) {
        self.status = status;
        self.error_code = error_code.into();
        self.last_status_update = Utc::now();
    }
}
