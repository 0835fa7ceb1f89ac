//! OCPP 1.6 WebSocket server
//!
//! Accepts charge-point connections at `ws://<host>:<port>/ocpp/{charge_point_id}`
//! and `ws://<host>:<port>/ocpp/1.6/{charge_point_id}`.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::application::charging::session::SharedSessionManager;
use crate::application::handlers::OcppMessageRouter;
use crate::support::shutdown::ShutdownSignal;

/// OCPP 1.6 WebSocket subprotocol
const OCPP_SUBPROTOCOL: &str = "ocpp1.6";

type ServerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// OCPP WebSocket Server
pub struct OcppServer {
    address: String,
    manager: SharedSessionManager,
    shutdown_signal: Option<ShutdownSignal>,
}

impl OcppServer {
    pub fn new(address: impl Into<String>, manager: SharedSessionManager) -> Self {
        Self {
            address: address.into(),
            manager,
            shutdown_signal: None,
        }
    }

    /// Set the shutdown signal for graceful shutdown
    pub fn with_shutdown(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown_signal = Some(signal);
        self
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(&self) -> ServerResult {
        let listener = TcpListener::bind(&self.address).await?;
        self.run_on(listener).await
    }

    /// Serve on an already bound listener
    pub async fn run_on(&self, listener: TcpListener) -> ServerResult {
        let addr = listener.local_addr()?;
        info!("🔌 OCPP 1.6 Central System started on ws://{}", addr);
        info!(
            "   Charge points should connect to: ws://{}/ocpp/{{charge_point_id}}",
            addr
        );

        match self.shutdown_signal.clone() {
            Some(shutdown) => self.run_with_shutdown(listener, shutdown).await,
            None => self.run_loop(listener).await,
        }
    }

    async fn run_loop(&self, listener: TcpListener) -> ServerResult {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => self.spawn_connection(stream, addr),
                Err(e) => error!("Failed to accept connection: {}", e),
            }
        }
    }

    async fn run_with_shutdown(&self, listener: TcpListener, shutdown: ShutdownSignal) -> ServerResult {
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => self.spawn_connection(stream, addr),
                        Err(e) => error!("Failed to accept connection: {}", e),
                    }
                }
                _ = shutdown.notified().wait() => {
                    info!("🛑 WebSocket server received shutdown signal");
                    let connected = self.manager.count();
                    if connected > 0 {
                        info!("📢 Closing {} charge point connections", connected);
                    }
                    return Ok(());
                }
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let manager = self.manager.clone();
        let shutdown = self.shutdown_signal.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, addr, manager, shutdown).await {
                error!("Connection error from {}: {}", addr, e);
            }
        });
    }

    pub fn session_manager(&self) -> &SharedSessionManager {
        &self.manager
    }
}

/// Extract the charge point ID from the request path.
///
/// Accepts `/ocpp/{id}` and `/ocpp/1.6/{id}`. The version segment alone is
/// not an id.
fn extract_charge_point_id(path: &str) -> Option<String> {
    let rest = path.strip_prefix("/ocpp/")?;
    let id = rest.strip_prefix("1.6/").unwrap_or(rest);

    if id.is_empty() || id == "1.6" || id.contains('/') {
        return None;
    }
    Some(id.to_string())
}

fn not_found(path: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(format!("No OCPP endpoint at {}", path)));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

/// Handle a single WebSocket connection
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    manager: SharedSessionManager,
    shutdown: Option<ShutdownSignal>,
) -> ServerResult {
    debug!("New connection from: {}", addr);

    let mut charge_point_id: Option<String> = None;

    let ws_stream = tokio_tungstenite::accept_hdr_async(
        stream,
        |req: &Request, mut response: Response| {
            let path = req.uri().path();

            let Some(id) = extract_charge_point_id(path) else {
                warn!("Rejecting WebSocket handshake from {} on {}", addr, path);
                return Err(not_found(path));
            };

            let requested_protocols = req
                .headers()
                .get("Sec-WebSocket-Protocol")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");

            let supports_ocpp16 = requested_protocols
                .split(',')
                .map(|s| s.trim())
                .any(|p| p == OCPP_SUBPROTOCOL);

            if supports_ocpp16 {
                response.headers_mut().insert(
                    "Sec-WebSocket-Protocol",
                    HeaderValue::from_static(OCPP_SUBPROTOCOL),
                );
            } else if !requested_protocols.is_empty() {
                warn!(
                    "Client does not support ocpp1.6, requested: {}",
                    requested_protocols
                );
            }

            charge_point_id = Some(id);
            Ok(response)
        },
    )
    .await?;

    let Some(charge_point_id) = charge_point_id else {
        return Ok(());
    };

    info!("[{}] Connected from {}", charge_point_id, addr);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let session = manager.register(&charge_point_id, tx).await;
    let connection_id = session.connection_id;
    let router = OcppMessageRouter::new(charge_point_id.clone(), manager.clone());

    // Outgoing message sender task
    let cp_id_send = charge_point_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            debug!("[{}] -> {}", cp_id_send, msg);
            if let Err(e) = ws_sender.send(Message::Text(msg)).await {
                error!("[{}] Send error: {}", cp_id_send, e);
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    // Incoming messages, one frame at a time
    let cp_id_recv = charge_point_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if let Some(reply) = router.handle(&text).await {
                        if let Err(e) = session.send(reply) {
                            error!("[{}] Failed to send response: {}", cp_id_recv, e);
                            break;
                        }
                    }
                }
                Ok(Message::Close(frame)) => {
                    debug!("[{}] Close frame received: {:?}", cp_id_recv, frame);
                    break;
                }
                Ok(Message::Binary(data)) => {
                    warn!(
                        "[{}] Binary message received ({} bytes), ignoring",
                        cp_id_recv,
                        data.len()
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    error!("[{}] WebSocket error: {}", cp_id_recv, e);
                    break;
                }
            }
        }
    });

    match shutdown {
        Some(shutdown) => {
            tokio::select! {
                _ = &mut send_task => {},
                _ = &mut recv_task => {},
                _ = shutdown.notified().wait() => {
                    info!("[{}] Connection closing due to server shutdown", charge_point_id);
                }
            }
        }
        None => {
            tokio::select! {
                _ = &mut send_task => {},
                _ = &mut recv_task => {},
            }
        }
    }

    recv_task.abort();
    send_task.abort();
    manager.unregister(&charge_point_id, connection_id).await;

    info!("[{}] Disconnected", charge_point_id);
    Ok(())
}
