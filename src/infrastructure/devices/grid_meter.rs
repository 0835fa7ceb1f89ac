//! HomeWizard P1 meter over its local HTTP API
//!
//! Meter downtime is common, so every failure ends up as an absent reading
//! rather than an error. The HTTP client is rebuilt after each failure.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{Device, GridMeter, ReadingCell};
use crate::domain::{
    DeviceCommunicationError, DeviceUpdate, GridReading, MeterUnavailableError, Power, Voltage,
};

#[derive(Debug, Deserialize)]
struct P1MeterValues {
    active_power_w: f64,
    active_voltage_l1_v: f64,
    #[serde(default)]
    active_voltage_l2_v: Option<f64>,
    #[serde(default)]
    active_voltage_l3_v: Option<f64>,
}

pub struct P1Meter {
    host: String,
    url: String,
    timeout: Duration,
    client: Mutex<Client>,
    state: ReadingCell<GridReading>,
}

impl P1Meter {
    pub fn new(host: impl Into<String>, timeout: Duration) -> Result<Self, MeterUnavailableError> {
        let host = host.into();
        Ok(Self {
            url: format!("http://{host}/api/v1/data"),
            host,
            timeout,
            client: Mutex::new(build_client(timeout)?),
            state: ReadingCell::new(),
        })
    }

    async fn fetch(&self) -> Result<GridReading, MeterUnavailableError> {
        let client = self.client.lock().await.clone();
        let response = client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| MeterUnavailableError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MeterUnavailableError::Status(status.as_u16()));
        }

        let values: P1MeterValues = response
            .json()
            .await
            .map_err(|e| MeterUnavailableError::Decode(e.to_string()))?;
        debug!(
            host = self.host.as_str(),
            power = values.active_power_w,
            l1 = values.active_voltage_l1_v,
            l2 = ?values.active_voltage_l2_v,
            l3 = ?values.active_voltage_l3_v,
            "P1 meter values"
        );

        Ok(GridReading {
            power: Power(values.active_power_w as i32),
            voltage: Voltage(values.active_voltage_l1_v.max(0.0) as u32),
        })
    }

    async fn recreate_client(&self) {
        match build_client(self.timeout) {
            Ok(client) => *self.client.lock().await = client,
            Err(e) => warn!(host = self.host.as_str(), error = %e, "Failed to rebuild HTTP client"),
        }
    }
}

fn build_client(timeout: Duration) -> Result<Client, MeterUnavailableError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| MeterUnavailableError::Transport(format!("failed to build HTTP client: {e}")))
}

#[async_trait]
impl Device for P1Meter {
    type Reading = GridReading;

    /// Never fails; an unavailable meter clears the cached reading.
    async fn update(&self) -> Result<(), DeviceCommunicationError> {
        match self.fetch().await {
            Ok(reading) => self.state.store(reading),
            Err(e) => {
                warn!(host = self.host.as_str(), error = %e, "Grid meter unavailable");
                self.recreate_client().await;
                self.state.clear();
            }
        }
        Ok(())
    }

    fn state(&self) -> Option<DeviceUpdate<GridReading>> {
        self.state.get()
    }
}

impl GridMeter for P1Meter {}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::net::SocketAddr;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Answers each connection with the next canned `(status, body)`.
    async fn spawn_meter(responses: Vec<(u16, &'static str)>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut responses: VecDeque<_> = responses.into();

        tokio::spawn(async move {
            while let Some((status, body)) = responses.pop_front() {
                let (mut stream, _) = listener.accept().await.unwrap();
                let mut buf = vec![0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let reply = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(reply.as_bytes()).await.unwrap();
                let _ = stream.shutdown().await;
            }
        });

        addr
    }

    const VALUES: &str = r#"{"active_power_w":512.7,"active_voltage_l1_v":231.4,"active_voltage_l2_v":230.0,"active_voltage_l3_v":229.1,"wifi_ssid":"x"}"#;

    #[tokio::test]
    async fn reads_power_and_voltage() {
        let addr = spawn_meter(vec![(200, VALUES)]).await;
        let meter = P1Meter::new(addr.to_string(), Duration::from_secs(2)).unwrap();

        meter.update().await.unwrap();

        let reading = meter.state().unwrap().reading;
        assert_eq!(reading.power, Power(512));
        assert_eq!(reading.voltage, Voltage(231));
    }

    #[tokio::test]
    async fn single_phase_meter_without_l2_l3() {
        let addr = spawn_meter(vec![(
            200,
            r#"{"active_power_w":-1200.0,"active_voltage_l1_v":229.9}"#,
        )])
        .await;
        let meter = P1Meter::new(addr.to_string(), Duration::from_secs(2)).unwrap();

        meter.update().await.unwrap();

        assert_eq!(meter.state().unwrap().reading.power, Power(-1200));
    }

    #[tokio::test]
    async fn error_status_yields_absence_not_error() {
        let addr = spawn_meter(vec![(200, VALUES), (503, "{}"), (200, VALUES)]).await;
        let meter = P1Meter::new(addr.to_string(), Duration::from_secs(2)).unwrap();

        meter.update().await.unwrap();
        assert!(meter.state().is_some());

        assert!(meter.update().await.is_ok());
        assert!(meter.state().is_none());

        // recreated client keeps working
        meter.update().await.unwrap();
        assert!(meter.state().is_some());
    }

    #[tokio::test]
    async fn unreachable_meter_yields_absence() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let meter = P1Meter::new(addr.to_string(), Duration::from_millis(500)).unwrap();

        assert!(meter.update().await.is_ok());
        assert!(meter.state().is_none());
    }
}
