//! Device records parsed from `adb devices -l` output.
//!
//! Device state is never cached — callers re-query before acting.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Connection state of an attached device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    /// Ready to accept commands (wire state `device`).
    Connected,
    /// Attached but not authorized for debugging.
    Unauthorized,
    /// Offline or otherwise unusable.
    Absent,
}

impl DeviceState {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "device" => DeviceState::Connected,
            "unauthorized" => DeviceState::Unauthorized,
            _ => DeviceState::Absent,
        }
    }

    /// The state word as it appears on the wire.
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            DeviceState::Connected => "device",
            DeviceState::Unauthorized => "unauthorized",
            DeviceState::Absent => "offline",
        }
    }
}

/// One attached device, as reported by the listing command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Serial or transport identifier.
    pub id: String,
    /// Connection state.
    pub state: DeviceState,
    /// Trailing `key:value` attributes (model, product, transport_id, ...).
    pub attributes: HashMap<String, String>,
}

impl Device {
    pub fn is_connected(&self) -> bool {
        self.state == DeviceState::Connected
    }

    /// Human-readable model name, when the listing carried one.
    pub fn model(&self) -> Option<&str> {
        self.attributes.get("model").map(String::as_str)
    }
}

/// Screen orientation as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl Orientation {
    /// Map a surface rotation code to an orientation.
    /// Codes 0/2 are portrait (upright/inverted), 1/3 landscape.
    pub fn from_rotation_code(code: i64) -> Option<Self> {
        match code {
            0 | 2 => Some(Orientation::Portrait),
            1 | 3 => Some(Orientation::Landscape),
            _ => None,
        }
    }

    /// The `user_rotation` setting value that produces this orientation.
    pub fn rotation_setting(&self) -> u8 {
        match self {
            Orientation::Portrait => 0,
            Orientation::Landscape => 1,
        }
    }
}

// ── Listing parser ────────────────────────────────────────────────

/// Parse the output of `devices -l`: skip the header line, then one
/// device per line as `<id> <state> [key:value]...`. Unparsable lines
/// are skipped rather than failing the whole listing.
pub fn parse_device_list(raw: &str) -> Vec<Device> {
    raw.lines().skip(1).filter_map(parse_device_line).collect()
}

fn parse_device_line(line: &str) -> Option<Device> {
    let mut tokens = line.split_whitespace();
    let id = tokens.next()?;
    let state = tokens.next()?;

    let mut attributes = HashMap::new();
    for token in tokens {
        if let Some((key, value)) = token.split_once(':') {
            attributes.insert(key.to_string(), value.to_string());
        }
    }

    Some(Device {
        id: id.to_string(),
        state: DeviceState::from_wire(state),
        attributes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "List of devices attached\n\
        emulator-5554          device product:sdk_gphone64_x86_64 model:sdk_gphone64_x86_64 device:emu64xa transport_id:1\n\
        R5CT20ABCDE            unauthorized transport_id:2\n\
        192.168.1.40:5555      offline\n";

    #[test]
    fn parses_listing_with_attributes() {
        let devices = parse_device_list(LISTING);
        assert_eq!(devices.len(), 3);

        assert_eq!(devices[0].id, "emulator-5554");
        assert_eq!(devices[0].state, DeviceState::Connected);
        assert_eq!(devices[0].model(), Some("sdk_gphone64_x86_64"));
        assert_eq!(
            devices[0].attributes.get("transport_id").map(String::as_str),
            Some("1")
        );

        assert_eq!(devices[1].state, DeviceState::Unauthorized);
        assert_eq!(devices[2].state, DeviceState::Absent);
    }

    #[test]
    fn skips_header_and_blank_lines() {
        let devices = parse_device_list("List of devices attached\n\n");
        assert!(devices.is_empty());
    }

    #[test]
    fn skips_unparsable_lines() {
        let devices = parse_device_list("List of devices attached\nlonetoken\nserial device\n");
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id, "serial");
    }

    #[test]
    fn orientation_rotation_codes() {
        assert_eq!(
            Orientation::from_rotation_code(0),
            Some(Orientation::Portrait)
        );
        assert_eq!(
            Orientation::from_rotation_code(2),
            Some(Orientation::Portrait)
        );
        assert_eq!(
            Orientation::from_rotation_code(1),
            Some(Orientation::Landscape)
        );
        assert_eq!(
            Orientation::from_rotation_code(3),
            Some(Orientation::Landscape)
        );
        assert_eq!(Orientation::from_rotation_code(7), None);
    }

    #[test]
    fn state_wire_round_trip() {
        for s in ["device", "unauthorized", "offline"] {
            assert_eq!(DeviceState::from_wire(s).as_wire_str(), s);
        }
        assert_eq!(DeviceState::from_wire("recovery"), DeviceState::Absent);
    }
}
