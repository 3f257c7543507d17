//! Event Hub — connection registry, session grouping, and fan-out
//! delivery for server-pushed events.
//!
//! Delivery is self-healing: a connection whose channel has gone away
//! is unregistered during the broadcast that discovered it, and with
//! it leaves every session.

mod event;

pub use event::{ClientMessage, DeviceSnapshot, ServerEvent};

use std::collections::{HashMap, HashSet};

use futures::future::join_all;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use crate::adb::AdbGateway;
use crate::error::{BridgeError, Result};

/// Identifies one client connection for its lifetime.
pub type ConnectionId = u64;

/// Outbound event channel depth per connection.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Cheap cloneable sender half of a registered connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, tx: mpsc::Sender<ServerEvent>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue an event for this connection.
    pub async fn send(&self, event: ServerEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| BridgeError::ChannelClosed)
    }
}

// ── Hub ───────────────────────────────────────────────────────────

#[derive(Default)]
struct HubState {
    connections: HashMap<ConnectionId, ConnectionHandle>,
    sessions: HashMap<String, HashSet<ConnectionId>>,
    next_id: ConnectionId,
}

/// Owns every registered connection and its session memberships.
pub struct EventHub {
    gateway: AdbGateway,
    state: Mutex<HubState>,
}

impl EventHub {
    pub fn new(gateway: AdbGateway) -> Self {
        Self {
            gateway,
            state: Mutex::new(HubState::default()),
        }
    }

    /// Register a new connection. The returned receiver is the
    /// connection's outbound event queue; the first two events on it
    /// are the confirmation and a device snapshot.
    pub async fn register(&self) -> (ConnectionHandle, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let handle = {
            let mut state = self.state.lock().await;
            state.next_id += 1;
            let handle = ConnectionHandle::new(state.next_id, tx);
            state.connections.insert(handle.id, handle.clone());
            handle
        };
        debug!(id = handle.id, "connection registered");

        let _ = handle
            .send(ServerEvent::ConnectionEstablished {
                message: "connected to device bridge".into(),
            })
            .await;
        let devices = self.device_snapshot().await;
        let _ = handle.send(ServerEvent::Devices { devices }).await;

        (handle, rx)
    }

    /// Remove a connection and purge it from every session. Sessions
    /// left empty are dropped.
    pub async fn unregister(&self, id: ConnectionId) {
        let mut state = self.state.lock().await;
        state.connections.remove(&id);
        for members in state.sessions.values_mut() {
            members.remove(&id);
        }
        state.sessions.retain(|_, members| !members.is_empty());
        debug!(id, "connection unregistered");
    }

    /// Add a connection to a session group and confirm it.
    pub async fn join_session(
        &self,
        handle: &ConnectionHandle,
        session_id: &str,
        device_id: Option<String>,
    ) {
        {
            let mut state = self.state.lock().await;
            state
                .sessions
                .entry(session_id.to_string())
                .or_default()
                .insert(handle.id);
        }
        debug!(id = handle.id, session_id, "joined session");

        let _ = handle
            .send(ServerEvent::SessionRegistered {
                session_id: session_id.to_string(),
                device_id,
                connected_at: unix_now(),
            })
            .await;
    }

    /// Deliver an event to one connection; unregister it on failure.
    pub async fn send_to(&self, id: ConnectionId, event: ServerEvent) {
        let handle = {
            let state = self.state.lock().await;
            state.connections.get(&id).cloned()
        };
        if let Some(handle) = handle {
            if handle.send(event).await.is_err() {
                warn!(id, "dropping dead connection");
                self.unregister(id).await;
            }
        }
    }

    /// Deliver an event to every member of a session, or to every
    /// connection when no session is named (or it does not exist).
    /// Failed deliveries unregister the offending connection.
    pub async fn broadcast(&self, event: ServerEvent, session: Option<&str>) {
        let targets: Vec<ConnectionHandle> = {
            let state = self.state.lock().await;
            match session.and_then(|s| state.sessions.get(s)) {
                Some(members) => members
                    .iter()
                    .filter_map(|id| state.connections.get(id).cloned())
                    .collect(),
                None => state.connections.values().cloned().collect(),
            }
        };

        let results = join_all(
            targets
                .iter()
                .map(|handle| handle.send(event.clone())),
        )
        .await;

        for (handle, result) in targets.iter().zip(results) {
            if result.is_err() {
                warn!(id = handle.id, "dropping dead connection during broadcast");
                self.unregister(handle.id).await;
            }
        }
    }

    /// Fresh snapshot of command-ready devices; listing failures
    /// degrade to an empty snapshot rather than an error event.
    pub async fn device_snapshot(&self) -> Vec<DeviceSnapshot> {
        match self.gateway.devices().await {
            Ok(devices) => devices
                .iter()
                .filter(|d| d.is_connected())
                .map(DeviceSnapshot::from)
                .collect(),
            Err(e) => {
                warn!("device listing failed: {e}");
                Vec::new()
            }
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.state.lock().await.connections.len()
    }

    pub async fn session_members(&self, session_id: &str) -> Vec<ConnectionId> {
        let state = self.state.lock().await;
        state
            .sessions
            .get(session_id)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default()
    }
}

fn unix_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
