//! Session manager: registry of connected charge points and the shared
//! transaction id counter

use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::infrastructure::storage::{ChargingRecordStore, DiscardingRecordStore};

use super::connection::ChargePointSession;

/// Heartbeat interval handed out in BootNotification responses
pub const DEFAULT_HEARTBEAT_INTERVAL: u32 = 300;

/// Owns every [`ChargePointSession`] and implements the OCPP action handlers.
///
/// Lookups go straight to the concurrent map; inserts and removals are
/// additionally serialized by `registry_lock` so a connect racing a
/// disconnect for the same id cannot lose an update.
pub struct OcppSessionManager {
    sessions: DashMap<String, Arc<ChargePointSession>>,
    registry_lock: Mutex<()>,
    next_connection_id: AtomicU64,
    next_transaction_id: AtomicI32,
    heartbeat_interval: u32,
    pub(crate) store: Arc<dyn ChargingRecordStore>,
}

/// Shared, reference-counted session manager
pub type SharedSessionManager = Arc<OcppSessionManager>;

impl OcppSessionManager {
    pub fn new(heartbeat_interval: u32, store: Arc<dyn ChargingRecordStore>) -> Self {
        Self {
            sessions: DashMap::new(),
            registry_lock: Mutex::new(()),
            next_connection_id: AtomicU64::new(1),
            next_transaction_id: AtomicI32::new(1),
            heartbeat_interval,
            store,
        }
    }

    /// Wrap in `Arc` for shared ownership
    pub fn shared(self) -> SharedSessionManager {
        Arc::new(self)
    }

    pub fn heartbeat_interval(&self) -> u32 {
        self.heartbeat_interval
    }

    /// Register a freshly connected charge point.
    ///
    /// A session already registered under the same id is replaced; its
    /// connection keeps running until its socket closes, but its later
    /// `unregister` no longer matches.
    pub async fn register(
        &self,
        charge_point_id: &str,
        sender: mpsc::UnboundedSender<String>,
    ) -> Arc<ChargePointSession> {
        let _guard = self.registry_lock.lock().await;

        let connection_id = self.next_connection_id.fetch_add(1, Ordering::SeqCst);
        let session = Arc::new(ChargePointSession::new(
            connection_id,
            charge_point_id,
            sender,
        ));

        if let Some(previous) = self
            .sessions
            .insert(charge_point_id.to_string(), session.clone())
        {
            warn!(
                charge_point_id,
                previous_connection = previous.connection_id,
                dropped_transactions = previous.active_transaction_ids().len(),
                "Replacing existing charge point session"
            );
        }

        info!(charge_point_id, connection_id, "Registered charge point session");
        session
    }

    /// Remove the session created by `connection_id`.
    ///
    /// Returns `false` when the id is unknown or now belongs to a newer
    /// connection.
    pub async fn unregister(&self, charge_point_id: &str, connection_id: u64) -> bool {
        let _guard = self.registry_lock.lock().await;

        match self
            .sessions
            .remove_if(charge_point_id, |_, s| s.connection_id == connection_id)
        {
            Some((_, session)) => {
                let in_flight = session.active_transaction_ids();
                if !in_flight.is_empty() {
                    warn!(
                        charge_point_id,
                        transactions = ?in_flight,
                        "Dropping in-flight transactions on disconnect"
                    );
                }
                info!(charge_point_id, connection_id, "Unregistered charge point session");
                true
            }
            None => {
                warn!(
                    charge_point_id,
                    connection_id, "Attempted to unregister unknown or superseded session"
                );
                false
            }
        }
    }

    pub fn session(&self, charge_point_id: &str) -> Option<Arc<ChargePointSession>> {
        self.sessions.get(charge_point_id).map(|s| s.clone())
    }

    /// Send a message to a specific charge point
    pub fn send_to(&self, charge_point_id: &str, message: String) -> Result<(), String> {
        match self.sessions.get(charge_point_id) {
            Some(session) => session.send(message),
            None => Err(format!("Charge point {} not connected", charge_point_id)),
        }
    }

    /// Check if a charge point is currently connected
    pub fn is_connected(&self, charge_point_id: &str) -> bool {
        self.sessions.contains_key(charge_point_id)
    }

    /// Get all connected charge point IDs
    pub fn connected_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|r| r.key().clone()).collect()
    }

    /// Number of active sessions
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Next transaction id. Never reused for the lifetime of this manager.
    pub(crate) fn allocate_transaction_id(&self) -> i32 {
        self.next_transaction_id.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for OcppSessionManager {
    fn default() -> Self {
        Self::new(DEFAULT_HEARTBEAT_INTERVAL, Arc::new(DiscardingRecordStore))
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_and_unregister() {
        let manager = OcppSessionManager::default();
        let (tx, _rx) = mpsc::unbounded_channel();

        let session = manager.register("CP001", tx).await;
        assert!(manager.is_connected("CP001"));
        assert_eq!(manager.count(), 1);
        assert_eq!(manager.connected_ids(), vec!["CP001".to_string()]);

        assert!(manager.unregister("CP001", session.connection_id).await);
        assert!(!manager.is_connected("CP001"));
        assert!(manager.session("CP001").is_none());
    }

    #[tokio::test]
    async fn stale_unregister_keeps_newer_session() {
        let manager = OcppSessionManager::default();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();

        let first = manager.register("CP001", tx1).await;
        let second = manager.register("CP001", tx2).await;
        assert_ne!(first.connection_id, second.connection_id);

        assert!(!manager.unregister("CP001", first.connection_id).await);
        let current = manager.session("CP001").unwrap();
        assert_eq!(current.connection_id, second.connection_id);
    }

    #[tokio::test]
    async fn send_to_routes_by_id() {
        let manager = OcppSessionManager::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        manager.register("CP001", tx).await;

        manager.send_to("CP001", "ping".into()).unwrap();
        assert_eq!(rx.recv().await.unwrap(), "ping");
        assert!(manager.send_to("CP404", "ping".into()).is_err());
    }

    #[test]
    fn transaction_ids_start_at_one() {
        let manager = OcppSessionManager::default();
        assert_eq!(manager.allocate_transaction_id(), 1);
        assert_eq!(manager.allocate_transaction_id(), 2);
        assert_eq!(manager.heartbeat_interval(), DEFAULT_HEARTBEAT_INTERVAL);
    }

    #[test]
    fn managers_do_not_share_counters() {
        let a = OcppSessionManager::default();
        let b = OcppSessionManager::default();
        a.allocate_transaction_id();
        a.allocate_transaction_id();
        assert_eq!(b.allocate_transaction_id(), 1);
    }
}
