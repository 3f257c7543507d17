//! Device automation bridge — core library.
//!
//! Bridges a controller process to Android devices over the adb text
//! protocol: command execution with hard time budgets, input
//! injection, UI-tree introspection with fuzzy element matching, and
//! multiplexed screen streaming fanned out through an event hub.
//!
//! ```text
//! clients ── EventHub ── StreamEngine ──┐
//!                │                      ├── AdbGateway ── adb ── devices
//! planner ──── Bridge ─── Hierarchy ────┘
//!                          Extractor
//! ```
//!
//! Everything above the gateway is transport-agnostic; tests drive the
//! whole stack with scripted [`adb::CommandRunner`] implementations.

pub mod adb;
pub mod bridge;
pub mod error;
pub mod hub;
pub mod stream;
pub mod ui;

pub use adb::{AdbGateway, CommandRunner, Device, DeviceState, Orientation};
pub use bridge::{ActionResult, Bridge};
pub use error::{BridgeError, Result};
pub use hub::{ClientMessage, ConnectionHandle, ConnectionId, DeviceSnapshot, EventHub, ServerEvent};
pub use stream::{StreamConfig, StreamEngine, TranscodeConfig};
pub use ui::{Bounds, HierarchyExtractor, MatchCriteria, UiElement};
