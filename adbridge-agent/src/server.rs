//! WebSocket event transport.
//!
//! One task pair per client: the reader dispatches tagged JSON
//! messages into the hub and engine, the writer pumps the connection's
//! hub channel out to the socket. Disconnects drop the client from
//! every stream and session.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use adbridge_core::error::{BridgeError, Result};
use adbridge_core::hub::{ClientMessage, ConnectionHandle, EventHub, ServerEvent};
use adbridge_core::stream::StreamEngine;

/// Accepts WebSocket clients and wires them to the hub and engine.
pub struct AgentServer {
    listen_addr: String,
    hub: Arc<EventHub>,
    engine: Arc<StreamEngine>,
}

impl AgentServer {
    pub fn new(listen_addr: String, hub: Arc<EventHub>, engine: Arc<StreamEngine>) -> Self {
        Self {
            listen_addr,
            hub,
            engine,
        }
    }

    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.listen_addr).await?;
        info!("listening on {}", self.listen_addr);

        loop {
            let (stream, peer) = listener.accept().await?;
            let hub = self.hub.clone();
            let engine = self.engine.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, hub, engine).await {
                    debug!(%peer, "connection ended: {e}");
                }
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    hub: Arc<EventHub>,
    engine: Arc<StreamEngine>,
) -> Result<()> {
    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| BridgeError::Other(format!("websocket handshake failed: {e}")))?;
    let (mut sink, mut source) = ws.split();

    let (conn, mut events) = hub.register().await;
    info!(id = conn.id(), "client connected");

    // Writer pump: queued hub events out to the socket.
    let writer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = source.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                handle_message(&text, &conn, &hub, &engine).await;
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {} // ping/pong/binary: nothing to do
        }
    }

    info!(id = conn.id(), "client disconnected");
    engine.drop_connection(conn.id()).await;
    hub.unregister(conn.id()).await;
    writer.abort();
    Ok(())
}

async fn handle_message(
    text: &str,
    conn: &ConnectionHandle,
    hub: &EventHub,
    engine: &Arc<StreamEngine>,
) {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(id = conn.id(), "unrecognized message: {e}");
            let _ = conn
                .send(ServerEvent::Error {
                    message: format!("unrecognized message: {e}"),
                })
                .await;
            return;
        }
    };

    match msg {
        ClientMessage::RegisterSession {
            session_id,
            device_id,
        } => {
            hub.join_session(conn, &session_id, device_id).await;
        }
        ClientMessage::StartScreenStream {
            device_id,
            use_scrcpy,
        } => {
            if use_scrcpy {
                debug!(device_id, "scrcpy requested; serving the screenshot method");
            }
            let info = engine.subscribe(&device_id, conn.clone()).await;
            if info.newly_started {
                let _ = conn
                    .send(ServerEvent::StreamStarted {
                        device_id,
                        method: info.method.to_string(),
                        format: info.format.to_string(),
                        fps: info.fps,
                    })
                    .await;
            }
        }
        ClientMessage::StopScreenStream { device_id } => {
            engine.unsubscribe(&device_id, conn.id()).await;
        }
        ClientMessage::RefreshDevices | ClientMessage::GetDevices => {
            let devices = hub.device_snapshot().await;
            let _ = conn.send(ServerEvent::Devices { devices }).await;
        }
    }
}
