//! Planner-facing facade over the bridge subsystems.
//!
//! Every operation returns an [`ActionResult`] — errors are folded
//! into a failed result with a message instead of crossing this
//! boundary, so the caller can always branch on the success flag.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::warn;

use crate::adb::AdbGateway;
use crate::error::{BridgeError, Result};
use crate::hub::{ConnectionHandle, ConnectionId, DeviceSnapshot, ServerEvent};
use crate::stream::{StreamConfig, StreamEngine};
use crate::ui::{
    DEFAULT_MIN_SIMILARITY, HierarchyExtractor, MatchCriteria, UiElement, find_element,
};

/// Outcome of a facade operation.
#[derive(Debug, Clone, Serialize)]
pub struct ActionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Recovery suggestion for the caller, present on some failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ActionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: None,
            hint: None,
        }
    }

    pub fn ok_with(data: Value) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            hint: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    fn from_error(err: BridgeError) -> Self {
        Self::fail(err.to_string())
    }
}

/// The synchronous query boundary: one call in, one result out.
pub struct Bridge {
    gateway: AdbGateway,
    extractor: HierarchyExtractor,
    engine: Arc<StreamEngine>,
}

impl Bridge {
    pub fn new(gateway: AdbGateway, stream_config: StreamConfig) -> Self {
        let extractor = HierarchyExtractor::new(gateway.clone());
        let engine = StreamEngine::new(gateway.clone(), stream_config);
        Self {
            gateway,
            extractor,
            engine,
        }
    }

    pub fn engine(&self) -> &Arc<StreamEngine> {
        &self.engine
    }

    pub fn gateway(&self) -> &AdbGateway {
        &self.gateway
    }

    // ── Devices ──────────────────────────────────────────────────

    /// List command-ready devices. Offline and unauthorized entries
    /// are excluded, matching the event-transport snapshot.
    pub async fn list_devices(&self) -> ActionResult {
        match self.gateway.devices().await {
            Ok(devices) => {
                let snapshots: Vec<DeviceSnapshot> = devices
                    .iter()
                    .filter(|d| d.is_connected())
                    .map(DeviceSnapshot::from)
                    .collect();
                match serde_json::to_value(snapshots) {
                    Ok(data) => ActionResult::ok_with(data),
                    Err(e) => ActionResult::from_error(e.into()),
                }
            }
            Err(e) => ActionResult::from_error(e),
        }
    }

    // ── Elements ─────────────────────────────────────────────────

    pub async fn get_elements(&self, device: &str, interactive_only: bool) -> ActionResult {
        match self.extractor.elements(device, interactive_only).await {
            Ok(elements) => match elements_to_value(&elements) {
                Ok(data) => ActionResult::ok_with(data),
                Err(e) => ActionResult::from_error(e),
            },
            Err(e) => ActionResult::from_error(e),
        }
    }

    pub async fn find_element(&self, device: &str, criteria: &MatchCriteria) -> ActionResult {
        match self.resolve(device, criteria).await {
            Ok(element) => match element_to_value(&element) {
                Ok(data) => ActionResult::ok_with(data),
                Err(e) => ActionResult::from_error(e),
            },
            Err(e) => not_found_result(e),
        }
    }

    // ── Input ────────────────────────────────────────────────────

    pub async fn tap(&self, device: &str, x: i32, y: i32) -> ActionResult {
        if let Err(e) = self.validate_point(device, x, y).await {
            return ActionResult::from_error(e);
        }
        match self.gateway.tap(device, x, y).await {
            Ok(()) => ActionResult::ok(format!("tapped ({x}, {y})")),
            Err(e) => ActionResult::from_error(e),
        }
    }

    pub async fn tap_element(&self, device: &str, criteria: &MatchCriteria) -> ActionResult {
        let element = match self.resolve(device, criteria).await {
            Ok(element) => element,
            Err(e) => return not_found_result(e),
        };
        let Some((x, y)) = element.center() else {
            return ActionResult::fail(format!(
                "matched {} but it has no usable bounds",
                element.describe()
            ));
        };
        match self.gateway.tap(device, x, y).await {
            Ok(()) => ActionResult::ok(format!("tapped {} at ({x}, {y})", element.describe())),
            Err(e) => ActionResult::from_error(e),
        }
    }

    pub async fn swipe(
        &self,
        device: &str,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        duration_ms: u32,
    ) -> ActionResult {
        match self.gateway.swipe(device, x1, y1, x2, y2, duration_ms).await {
            Ok(()) => ActionResult::ok(format!("swiped ({x1}, {y1}) -> ({x2}, {y2})")),
            Err(e) => ActionResult::from_error(e),
        }
    }

    pub async fn type_text(&self, device: &str, text: &str) -> ActionResult {
        match self.gateway.type_text(device, text).await {
            Ok(()) => ActionResult::ok(format!("typed {} characters", text.chars().count())),
            Err(e) => ActionResult::from_error(e),
        }
    }

    pub async fn press_key(&self, device: &str, key: &str) -> ActionResult {
        match self.gateway.press_key(device, key).await {
            Ok(()) => ActionResult::ok(format!("pressed {key}")),
            Err(e) => ActionResult::from_error(e),
        }
    }

    // ── Streaming ────────────────────────────────────────────────

    /// Subscribe a connection to a device's screen stream. On the
    /// idle→capturing transition the subscriber is told how frames
    /// will be produced.
    pub async fn start_stream(&self, device: &str, conn: &ConnectionHandle) -> ActionResult {
        let info = self.engine.subscribe(device, conn.clone()).await;
        if info.newly_started {
            let _ = conn
                .send(ServerEvent::StreamStarted {
                    device_id: device.to_string(),
                    method: info.method.to_string(),
                    format: info.format.to_string(),
                    fps: info.fps,
                })
                .await;
        }
        ActionResult::ok_with(json!({
            "method": info.method,
            "format": info.format,
            "fps": info.fps,
        }))
    }

    pub async fn stop_stream(&self, device: &str, conn_id: ConnectionId) -> ActionResult {
        self.engine.unsubscribe(device, conn_id).await;
        ActionResult::ok(format!("stream stopped for {device}"))
    }

    // ── Internals ────────────────────────────────────────────────

    async fn resolve(&self, device: &str, criteria: &MatchCriteria) -> Result<UiElement> {
        if criteria.is_empty() {
            return Err(BridgeError::ElementNotFound(
                "no match criteria given".into(),
            ));
        }
        let elements = self.extractor.elements(device, false).await?;
        find_element(&elements, criteria, DEFAULT_MIN_SIMILARITY)
            .cloned()
            .ok_or_else(|| BridgeError::ElementNotFound(criteria.describe()))
    }

    /// Reject coordinates outside the reported screen. When the size
    /// cannot be read the tap goes through unvalidated.
    async fn validate_point(&self, device: &str, x: i32, y: i32) -> Result<()> {
        let (width, height) = match self.gateway.screen_size(device).await {
            Ok(size) => size,
            Err(e) => {
                warn!(device, "screen size unavailable, skipping bounds check: {e}");
                return Ok(());
            }
        };
        if in_bounds(x, y, width, height) {
            Ok(())
        } else {
            Err(BridgeError::CoordinatesOutOfBounds {
                x,
                y,
                width,
                height,
            })
        }
    }
}

fn in_bounds(x: i32, y: i32, width: u32, height: u32) -> bool {
    x >= 0 && y >= 0 && (x as u32) < width && (y as u32) < height
}

fn not_found_result(err: BridgeError) -> ActionResult {
    let result = ActionResult::from_error(err);
    result.with_hint("list the on-screen elements and retry with criteria taken from a fresh snapshot")
}

fn element_to_value(element: &UiElement) -> Result<Value> {
    let mut value = serde_json::to_value(element)?;
    if let Value::Object(map) = &mut value {
        map.insert("center".into(), json!(element.center()));
    }
    Ok(value)
}

fn elements_to_value(elements: &[UiElement]) -> Result<Value> {
    let values: Result<Vec<Value>> = elements.iter().map(element_to_value).collect();
    Ok(Value::Array(values?))
}
