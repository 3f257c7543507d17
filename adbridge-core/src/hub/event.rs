//! Wire messages for the event transport.
//!
//! Every message is JSON with a `type` tag, decoded once at the
//! boundary into these closed enums. Unknown inbound types fail the
//! decode; handlers never re-inspect raw JSON.

use serde::{Deserialize, Serialize};

use crate::adb::Device;

/// Messages a client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Associate this connection with a logical session.
    #[serde(rename = "register:session")]
    RegisterSession {
        session_id: String,
        #[serde(default)]
        device_id: Option<String>,
    },

    /// Subscribe to screen frames for a device.
    #[serde(rename = "startScreenStream")]
    StartScreenStream {
        #[serde(rename = "deviceId")]
        device_id: String,
        /// Accepted for compatibility; frames are always produced by
        /// the screenshot method.
        #[serde(rename = "useScrcpy", default)]
        use_scrcpy: bool,
    },

    /// Unsubscribe from screen frames for a device.
    #[serde(rename = "stopScreenStream")]
    StopScreenStream {
        #[serde(rename = "deviceId")]
        device_id: String,
    },

    /// Ask for a fresh device listing.
    #[serde(rename = "refresh_devices")]
    RefreshDevices,

    /// Alias kept for older clients.
    #[serde(rename = "get_devices")]
    GetDevices,
}

/// Messages the server pushes to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "connection:established")]
    ConnectionEstablished { message: String },

    #[serde(rename = "devices")]
    Devices { devices: Vec<DeviceSnapshot> },

    #[serde(rename = "session:registered")]
    SessionRegistered {
        session_id: String,
        device_id: Option<String>,
        /// Unix timestamp (seconds).
        connected_at: f64,
    },

    #[serde(rename = "screen:streamStarted")]
    StreamStarted {
        #[serde(rename = "deviceId")]
        device_id: String,
        method: String,
        format: String,
        fps: u32,
    },

    #[serde(rename = "screen:updated")]
    ScreenUpdated {
        #[serde(rename = "deviceId")]
        device_id: String,
        /// Base64-encoded frame payload.
        screenshot: String,
        format: String,
    },

    #[serde(rename = "error")]
    Error { message: String },
}

/// Device entry in a `devices` event. `device`/`status` duplicate
/// `id`/`state` — older clients read the aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub id: String,
    pub device: String,
    pub state: String,
    pub status: String,
    pub model: String,
    pub name: String,
}

impl From<&Device> for DeviceSnapshot {
    fn from(d: &Device) -> Self {
        let model = d.model().unwrap_or("Unknown").to_string();
        Self {
            id: d.id.clone(),
            device: d.id.clone(),
            state: d.state.as_wire_str().to_string(),
            status: d.state.as_wire_str().to_string(),
            model: model.clone(),
            name: model,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adb::parse_device_list;

    #[test]
    fn client_messages_decode_by_tag() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"startScreenStream","deviceId":"emulator-5554","useScrcpy":false}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::StartScreenStream {
                device_id: "emulator-5554".into(),
                use_scrcpy: false,
            }
        );

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"register:session","session_id":"s1"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::RegisterSession {
                session_id: "s1".into(),
                device_id: None,
            }
        );
    }

    #[test]
    fn unknown_inbound_type_is_rejected() {
        let result = serde_json::from_str::<ClientMessage>(r#"{"type":"formatDevice"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn server_events_round_trip() {
        let events = vec![
            ServerEvent::ConnectionEstablished {
                message: "connected".into(),
            },
            ServerEvent::StreamStarted {
                device_id: "d1".into(),
                method: "screenshot".into(),
                format: "jpeg".into(),
                fps: 60,
            },
            ServerEvent::ScreenUpdated {
                device_id: "d1".into(),
                screenshot: "aGk=".into(),
                format: "jpeg".into(),
            },
            ServerEvent::Error {
                message: "boom".into(),
            },
        ];
        for event in events {
            let json = serde_json::to_string(&event).unwrap();
            let back: ServerEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(back, event);
        }
    }

    #[test]
    fn stream_events_use_camel_case_device_id() {
        let json = serde_json::to_string(&ServerEvent::ScreenUpdated {
            device_id: "d1".into(),
            screenshot: String::new(),
            format: "jpeg".into(),
        })
        .unwrap();
        assert!(json.contains("\"deviceId\":\"d1\""));
        assert!(json.contains("\"type\":\"screen:updated\""));
    }

    #[test]
    fn snapshot_carries_aliases() {
        let devices =
            parse_device_list("List of devices attached\nserial1 device model:Pixel_6\n");
        let snap = DeviceSnapshot::from(&devices[0]);
        assert_eq!(snap.id, snap.device);
        assert_eq!(snap.state, "device");
        assert_eq!(snap.status, "device");
        assert_eq!(snap.model, "Pixel_6");
        assert_eq!(snap.name, "Pixel_6");
    }
}
