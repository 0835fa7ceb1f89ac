//! Modbus/TCP transport backed by `tokio-modbus`

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_modbus::client::{tcp::attach_slave, Context, Reader, Writer};
use tokio_modbus::Slave;
use tracing::{info, instrument};

use super::client::{RegisterConnector, RegisterOperation, RegisterSession};
use crate::domain::DeviceCommunicationError;

#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
    unit_id: u8,
    connect_timeout: Duration,
    io_timeout: Duration,
}

impl TcpConnector {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        unit_id: u8,
        connect_timeout: Duration,
        io_timeout: Duration,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            unit_id,
            connect_timeout,
            io_timeout,
        }
    }

    fn error(&self, message: impl Into<String>) -> DeviceCommunicationError {
        DeviceCommunicationError::new(&self.host, message)
    }
}

#[async_trait]
impl RegisterConnector for TcpConnector {
    type Session = TcpSession;

    #[instrument(skip_all, fields(host = %self.host, port = self.port, unit_id = self.unit_id))]
    async fn connect(&self) -> Result<TcpSession, DeviceCommunicationError> {
        let stream = timeout(
            self.connect_timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        .map_err(|_| self.error("timed out while connecting"))?
        .map_err(|e| self.error(format!("failed to connect: {e}")))?;
        stream
            .set_nodelay(true)
            .map_err(|e| self.error(format!("failed to configure socket: {e}")))?;
        info!("connected");

        Ok(TcpSession {
            host: self.host.clone(),
            context: attach_slave(stream, Slave(self.unit_id)),
            io_timeout: self.io_timeout,
        })
    }

    fn host(&self) -> &str {
        &self.host
    }
}

pub struct TcpSession {
    host: String,
    context: Context,
    io_timeout: Duration,
}

#[async_trait]
impl RegisterSession for TcpSession {
    async fn call(
        &mut self,
        operation: &RegisterOperation,
    ) -> Result<Vec<u16>, DeviceCommunicationError> {
        let context = &mut self.context;
        let request = async move {
            match operation {
                RegisterOperation::ReadInput { address, count } => {
                    context.read_input_registers(*address, *count).await
                }
                RegisterOperation::ReadHolding { address, count } => {
                    context.read_holding_registers(*address, *count).await
                }
                RegisterOperation::WriteSingle { address, value } => context
                    .write_single_register(*address, *value)
                    .await
                    .map(|reply| reply.map(|()| Vec::new())),
                RegisterOperation::WriteMultiple { address, values } => context
                    .write_multiple_registers(*address, values)
                    .await
                    .map(|reply| reply.map(|()| Vec::new())),
            }
        };

        match timeout(self.io_timeout, request).await {
            Err(_) => Err(DeviceCommunicationError::new(
                &self.host,
                format!("timed out during {}", operation.name()),
            )),
            Ok(Err(e)) => Err(DeviceCommunicationError::new(
                &self.host,
                format!("{} failed: {e}", operation.name()),
            )),
            Ok(Ok(Err(exception))) => Err(DeviceCommunicationError::new(
                &self.host,
                format!("{} rejected: {exception:?}", operation.name()),
            )),
            Ok(Ok(Ok(words))) => Ok(words),
        }
    }
}
