//! Resilient register client
//!
//! Owns one session to one device. Operations are serialized; a failed
//! operation drops the session, reconnects and is retried exactly once.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::DeviceCommunicationError;

/// One request against a device's register map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOperation {
    ReadInput { address: u16, count: u16 },
    ReadHolding { address: u16, count: u16 },
    WriteSingle { address: u16, value: u16 },
    WriteMultiple { address: u16, values: Vec<u16> },
}

impl RegisterOperation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ReadInput { .. } => "read_input",
            Self::ReadHolding { .. } => "read_holding",
            Self::WriteSingle { .. } => "write_single",
            Self::WriteMultiple { .. } => "write_multiple",
        }
    }

    /// Words a well-formed reply carries.
    pub fn reply_len(&self) -> usize {
        match self {
            Self::ReadInput { count, .. } | Self::ReadHolding { count, .. } => usize::from(*count),
            Self::WriteSingle { .. } | Self::WriteMultiple { .. } => 0,
        }
    }
}

/// An established session. Writes answer with an empty word list.
#[async_trait]
pub trait RegisterSession: Send {
    async fn call(
        &mut self,
        operation: &RegisterOperation,
    ) -> Result<Vec<u16>, DeviceCommunicationError>;
}

/// Opens sessions to a single device.
#[async_trait]
pub trait RegisterConnector: Send + Sync {
    type Session: RegisterSession;

    async fn connect(&self) -> Result<Self::Session, DeviceCommunicationError>;

    /// Device address, for logs.
    fn host(&self) -> &str;
}

pub struct ResilientRegisterClient<C: RegisterConnector> {
    connector: C,
    session: Mutex<Option<C::Session>>,
    reconnects: AtomicU64,
}

impl<C: RegisterConnector> ResilientRegisterClient<C> {
    /// Does not connect; the first operation does.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            session: Mutex::new(None),
            reconnects: AtomicU64::new(0),
        }
    }

    pub fn host(&self) -> &str {
        self.connector.host()
    }

    /// Number of times a failed operation forced a fresh session.
    pub fn reconnect_count(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    /// Run `operation`, reconnecting and retrying once on failure.
    ///
    /// A reply of the wrong length counts as a failure. When the retry fails
    /// too, the error of the first attempt is returned.
    pub async fn execute(
        &self,
        operation: RegisterOperation,
    ) -> Result<Vec<u16>, DeviceCommunicationError> {
        let mut slot = self.session.lock().await;

        let first_error = match self.attempt(&mut slot, &operation).await {
            Ok(words) => return Ok(words),
            Err(e) => e,
        };

        warn!(
            host = self.host(),
            operation = operation.name(),
            error = %first_error,
            "Register operation failed, reconnecting"
        );
        *slot = None;
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("device_reconnects_total", "host" => self.host().to_string())
            .increment(1);

        match self.attempt(&mut slot, &operation).await {
            Ok(words) => Ok(words),
            Err(retry_error) => {
                *slot = None;
                warn!(
                    host = self.host(),
                    operation = operation.name(),
                    error = %retry_error,
                    "Register operation failed after reconnect"
                );
                Err(first_error)
            }
        }
    }

    async fn attempt(
        &self,
        slot: &mut Option<C::Session>,
        operation: &RegisterOperation,
    ) -> Result<Vec<u16>, DeviceCommunicationError> {
        let session = match slot.take() {
            Some(session) => session,
            None => {
                debug!(host = self.host(), "Opening register session");
                self.connector.connect().await?
            }
        };
        let words = slot.insert(session).call(operation).await?;

        if words.len() != operation.reply_len() {
            return Err(DeviceCommunicationError::new(
                self.host(),
                format!(
                    "{} returned {} words while expected {}",
                    operation.name(),
                    words.len(),
                    operation.reply_len()
                ),
            ));
        }
        Ok(words)
    }

    pub async fn read_input_registers(
        &self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, DeviceCommunicationError> {
        self.execute(RegisterOperation::ReadInput { address, count })
            .await
    }

    pub async fn read_holding_registers(
        &self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, DeviceCommunicationError> {
        self.execute(RegisterOperation::ReadHolding { address, count })
            .await
    }

    pub async fn write_single_register(
        &self,
        address: u16,
        value: u16,
    ) -> Result<(), DeviceCommunicationError> {
        self.execute(RegisterOperation::WriteSingle { address, value })
            .await
            .map(drop)
    }

    pub async fn write_multiple_registers(
        &self,
        address: u16,
        values: &[u16],
    ) -> Result<(), DeviceCommunicationError> {
        self.execute(RegisterOperation::WriteMultiple {
            address,
            values: values.to_vec(),
        })
        .await
        .map(drop)
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::testing::{FakeConnector, FakeDevice};
    use super::*;

    fn client(device: &Arc<FakeDevice>) -> ResilientRegisterClient<FakeConnector> {
        ResilientRegisterClient::new(FakeConnector(device.clone()))
    }

    #[tokio::test]
    async fn connects_lazily_and_reuses_session() {
        let device = FakeDevice::new();
        device.set(1020, &[0, 3000]);
        let client = client(&device);
        assert_eq!(device.connects(), 0);

        assert_eq!(client.read_input_registers(1020, 2).await.unwrap(), vec![0, 3000]);
        assert_eq!(client.read_input_registers(1020, 2).await.unwrap(), vec![0, 3000]);

        assert_eq!(device.connects(), 1);
        assert_eq!(client.reconnect_count(), 0);
    }

    #[tokio::test]
    async fn failure_on_fresh_session_recovers_with_one_reconnect() {
        let device = FakeDevice::new();
        device.set(50, &[120]);
        device.fail_next(1);
        let client = client(&device);

        let words = client.read_input_registers(50, 1).await.unwrap();

        assert_eq!(words, vec![120]);
        assert_eq!(client.reconnect_count(), 1);
        assert_eq!(device.connects(), 2);
        assert_eq!(device.calls(), 2);
    }

    #[tokio::test]
    async fn persistent_failure_retries_exactly_once() {
        let device = FakeDevice::new();
        device.fail_next(usize::MAX);
        let client = client(&device);

        let err = client.read_input_registers(50, 1).await.unwrap_err();

        assert_eq!(device.calls(), 2);
        assert_eq!(client.reconnect_count(), 1);
        // the caller sees the first failure, not the retry's
        assert_eq!(err.message, "scripted failure #1");
    }

    #[tokio::test]
    async fn unreachable_device_surfaces_connect_error() {
        let device = FakeDevice::new();
        device.set_unreachable(true);
        let client = client(&device);

        let err = client.write_single_register(6000, 1).await.unwrap_err();

        assert_eq!(err.message, "connection refused");
        assert_eq!(device.calls(), 0);
        assert_eq!(client.reconnect_count(), 1);
    }

    #[tokio::test]
    async fn session_is_reopened_after_device_comes_back() {
        let device = FakeDevice::new();
        let client = client(&device);
        device.set_unreachable(true);
        assert!(client.write_single_register(6000, 1).await.is_err());

        device.set_unreachable(false);
        client.write_single_register(6000, 1).await.unwrap();
        assert_eq!(device.get(6000), 1);
    }

    #[tokio::test]
    async fn short_reply_reconnects_and_retries() {
        let device = FakeDevice::new();
        device.set(30775, &[0, 1500]);
        device.short_next(1);
        let client = client(&device);

        let words = client.read_input_registers(30775, 2).await.unwrap();

        assert_eq!(words, vec![0, 1500]);
        assert_eq!(client.reconnect_count(), 1);
        assert_eq!(device.connects(), 2);
    }

    #[tokio::test]
    async fn persistently_short_reply_is_a_communication_error() {
        let device = FakeDevice::new();
        device.short_next(2);
        let client = client(&device);

        let err = client.read_holding_registers(5004, 2).await.unwrap_err();

        assert!(err.message.contains("expected 2"), "{}", err.message);
        assert_eq!(device.calls(), 2);
        assert_eq!(client.reconnect_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_callers_are_serialized() {
        let device = FakeDevice::new();
        device.set_latency(Duration::from_millis(10));
        let client = Arc::new(client(&device));

        let tasks: Vec<_> = (0..4)
            .map(|i| {
                let client = client.clone();
                tokio::spawn(async move { client.write_single_register(100 + i, i).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(device.max_in_flight(), 1);
        assert_eq!(device.writes().len(), 4);
    }
}
