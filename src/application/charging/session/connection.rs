//! Charge point session bound to one WebSocket connection

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::domain::{ConnectorState, RegistrationStatus, Transaction};

/// Outbound CALL awaiting its CALL_RESULT / CALL_ERROR
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCall {
    pub action: String,
    pub sent_at: DateTime<Utc>,
}

/// Live state of a connected charge point.
///
/// Created when the charge point connects and dropped when it disconnects;
/// nothing here outlives the connection.
#[derive(Debug)]
pub struct ChargePointSession {
    /// Unique identifier for this connection instance
    pub connection_id: u64,
    pub charge_point_id: String,
    /// Channel to the connection's writer task
    sender: mpsc::UnboundedSender<String>,
    pub connected_at: DateTime<Utc>,
    last_heartbeat_ms: AtomicI64,
    boot_accepted: AtomicBool,
    connectors: DashMap<u32, ConnectorState>,
    transactions: DashMap<i32, Transaction>,
    configuration: DashMap<String, String>,
    pending_calls: DashMap<String, PendingCall>,
}

impl ChargePointSession {
    pub fn new(
        connection_id: u64,
        charge_point_id: impl Into<String>,
        sender: mpsc::UnboundedSender<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            connection_id,
            charge_point_id: charge_point_id.into(),
            sender,
            connected_at: now,
            last_heartbeat_ms: AtomicI64::new(now.timestamp_millis()),
            boot_accepted: AtomicBool::new(false),
            connectors: DashMap::new(),
            transactions: DashMap::new(),
            configuration: DashMap::new(),
            pending_calls: DashMap::new(),
        }
    }

    /// Queue a message for the charge point
    pub fn send(&self, message: String) -> Result<(), String> {
        self.sender
            .send(message)
            .map_err(|e| format!("Failed to send message: {}", e))
    }

    // ── Registration / liveness ────────────────────────────

    pub fn registration(&self) -> RegistrationStatus {
        if self.boot_accepted.load(Ordering::Acquire) {
            RegistrationStatus::Accepted
        } else {
            RegistrationStatus::Pending
        }
    }

    pub(crate) fn accept_registration(&self) {
        self.boot_accepted.store(true, Ordering::Release);
    }

    pub fn last_heartbeat(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_heartbeat_ms.load(Ordering::Acquire))
            .unwrap_or(self.connected_at)
    }

    pub(crate) fn touch_heartbeat(&self) {
        self.last_heartbeat_ms
            .store(Utc::now().timestamp_millis(), Ordering::Release);
    }

    /// No heartbeat for longer than `timeout_seconds`
    pub fn is_stale(&self, timeout_seconds: i64) -> bool {
        let elapsed = Utc::now()
            .signed_duration_since(self.last_heartbeat())
            .num_seconds();
        elapsed > timeout_seconds
    }

    // ── Connectors ─────────────────────────────────────────

    pub fn connector(&self, connector_id: u32) -> Option<ConnectorState> {
        self.connectors.get(&connector_id).map(|c| c.clone())
    }

    /// All known connectors, ordered by id
    pub fn connectors(&self) -> Vec<ConnectorState> {
        let mut connectors: Vec<_> = self.connectors.iter().map(|c| c.clone()).collect();
        connectors.sort_by_key(|c| c.connector_id);
        connectors
    }

    /// Connector record, created on first reference.
    pub(crate) fn connector_mut(&self, connector_id: u32) -> RefMut<'_, u32, ConnectorState> {
        self.connectors
            .entry(connector_id)
            .or_insert_with(|| ConnectorState::new(connector_id))
    }

    // ── Transactions ───────────────────────────────────────

    pub fn transaction(&self, transaction_id: i32) -> Option<Transaction> {
        self.transactions.get(&transaction_id).map(|t| t.clone())
    }

    pub fn active_transaction_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.transactions.iter().map(|t| *t.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn insert_transaction(&self, transaction: Transaction) {
        self.transactions.insert(transaction.id, transaction);
    }

    pub(crate) fn remove_transaction(&self, transaction_id: i32) -> Option<Transaction> {
        self.transactions
            .remove(&transaction_id)
            .map(|(_, transaction)| transaction)
    }

    // ── Configuration ──────────────────────────────────────

    pub fn configuration_value(&self, key: &str) -> Option<String> {
        self.configuration.get(key).map(|v| v.clone())
    }

    /// Returns the previous value, if any.
    pub fn set_configuration(&self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.configuration.insert(key.into(), value.into())
    }

    pub fn configuration(&self) -> Vec<(String, String)> {
        let mut entries: Vec<_> = self
            .configuration
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        entries.sort();
        entries
    }

    // ── Pending outbound calls ─────────────────────────────

    pub(crate) fn record_pending(&self, unique_id: impl Into<String>, action: impl Into<String>) {
        self.pending_calls.insert(
            unique_id.into(),
            PendingCall {
                action: action.into(),
                sent_at: Utc::now(),
            },
        );
    }

    pub(crate) fn take_pending(&self, unique_id: &str) -> Option<PendingCall> {
        self.pending_calls.remove(unique_id).map(|(_, call)| call)
    }

    pub fn pending_count(&self) -> usize {
        self.pending_calls.len()
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ConnectorStatus;

    fn make_session() -> (ChargePointSession, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChargePointSession::new(1, "CP001", tx), rx)
    }

    #[test]
    fn new_session_is_pending_and_empty() {
        let (session, _rx) = make_session();
        assert_eq!(session.charge_point_id, "CP001");
        assert_eq!(session.registration(), RegistrationStatus::Pending);
        assert!(session.connectors().is_empty());
        assert!(session.active_transaction_ids().is_empty());
        assert_eq!(session.pending_count(), 0);
    }

    #[test]
    fn send_delivers_message() {
        let (session, mut rx) = make_session();
        session.send("hello".into()).unwrap();
        assert_eq!(rx.try_recv().unwrap(), "hello");
    }

    #[test]
    fn send_to_closed_channel_returns_error() {
        let (session, rx) = make_session();
        drop(rx);
        assert!(session.send("msg".into()).is_err());
    }

    #[test]
    fn connector_is_created_lazily() {
        let (session, _rx) = make_session();
        assert!(session.connector(2).is_none());

        session
            .connector_mut(2)
            .report(ConnectorStatus::Preparing, "NoError");

        let connector = session.connector(2).unwrap();
        assert_eq!(connector.status, ConnectorStatus::Preparing);
        assert_eq!(session.connectors().len(), 1);
    }

    #[test]
    fn pending_calls_are_taken_once() {
        let (session, _rx) = make_session();
        session.record_pending("abc", "Reset");
        assert_eq!(session.pending_count(), 1);

        let call = session.take_pending("abc").unwrap();
        assert_eq!(call.action, "Reset");
        assert!(session.take_pending("abc").is_none());
    }

    #[test]
    fn configuration_store() {
        let (session, _rx) = make_session();
        assert_eq!(session.set_configuration("HeartbeatInterval", "300"), None);
        assert_eq!(
            session.set_configuration("HeartbeatInterval", "60").as_deref(),
            Some("300")
        );
        assert_eq!(session.configuration_value("HeartbeatInterval").as_deref(), Some("60"));
        assert_eq!(
            session.configuration(),
            vec![("HeartbeatInterval".to_string(), "60".to_string())]
        );
    }

    #[test]
    fn heartbeat_freshness() {
        let (session, _rx) = make_session();
        session.touch_heartbeat();
        assert!(!session.is_stale(3600));
        assert!(
            session.last_heartbeat().timestamp_millis() >= session.connected_at.timestamp_millis()
        );
    }
}
