//! Charging transaction entity

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Charging transaction
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Transaction ID assigned by the session manager
    pub id: i32,
    /// Charge point ID
    pub charge_point_id: String,
    /// Connector ID
    pub connector_id: u32,
    /// ID tag that started the transaction
    pub id_tag: String,
    /// Meter value at start (Wh)
    pub meter_start: i32,
    /// When the transaction started
    pub started_at: DateTime<Utc>,
    /// Meter value at stop (Wh)
    pub meter_stop: Option<i32>,
    /// When the transaction stopped
    pub stopped_at: Option<DateTime<Utc>>,
    /// Stop reason
    pub stop_reason: Option<String>,
}

impl Transaction {
    pub fn start(
        id: i32,
        charge_point_id: impl Into<String>,
        connector_id: u32,
        id_tag: impl Into<String>,
        meter_start: i32,
    ) -> Self {
        Self {
            id,
            charge_point_id: charge_point_id.into(),
            connector_id,
            id_tag: id_tag.into(),
            meter_start,
            started_at: Utc::now(),
            meter_stop: None,
            stopped_at: None,
            stop_reason: None,
        }
    }

    pub fn stop(&mut self, meter_stop: i32, reason: Option<String>) {
        self.meter_stop = Some(meter_stop);
        self.stopped_at = Some(Utc::now());
        self.stop_reason = reason;
    }

    pub fn is_active(&self) -> bool {
        self.stopped_at.is_none()
    }

    /// Energy delivered in Wh, once stopped.
    pub fn energy_consumed(&self) -> Option<i64> {
        self.meter_stop
            .map(|stop| i64::from(stop) - i64::from(self.meter_start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_records_completion() {
        let mut tx = Transaction::start(1, "CP001", 1, "TAG", 1000);
        assert!(tx.is_active());
        assert_eq!(tx.energy_consumed(), None);

        tx.stop(4500, Some("Local".into()));
        assert!(!tx.is_active());
        assert_eq!(tx.energy_consumed(), Some(3500));
        assert_eq!(tx.stop_reason.as_deref(), Some("Local"));
    }

    #[test]
    fn energy_spans_the_full_meter_range() {
        let mut tx = Transaction::start(1, "CP001", 1, "TAG", i32::MAX);
        tx.stop(i32::MIN, None);
        assert_eq!(tx.energy_consumed(), Some(i64::from(i32::MIN) - i64::from(i32::MAX)));
    }
}
