//! On-screen element records extracted from a hierarchy dump.

use serde::{Deserialize, Serialize};

/// Pixel-space element rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Bounds {
    /// Parse the dump format `"[x1,y1][x2,y2]"`. Malformed input yields
    /// `None` — never an error, the element is kept without geometry.
    pub fn parse(raw: &str) -> Option<Bounds> {
        let raw = raw.trim();
        let inner = raw.strip_prefix('[')?.strip_suffix(']')?;
        let (first, second) = inner.split_once("][")?;
        let (x1, y1) = parse_pair(first)?;
        let (x2, y2) = parse_pair(second)?;
        Some(Bounds { x1, y1, x2, y2 })
    }

    /// Geometric center, the tap target for this element.
    pub fn center(&self) -> (i32, i32) {
        ((self.x1 + self.x2) / 2, (self.y1 + self.y2) / 2)
    }
}

fn parse_pair(s: &str) -> Option<(i32, i32)> {
    let (a, b) = s.split_once(',')?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}

/// One node of the extracted UI tree. Snapshots are fresh per
/// extraction and never cached across calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UiElement {
    #[serde(rename = "class")]
    pub class_name: String,
    pub resource_id: String,
    pub text: String,
    pub content_desc: String,
    pub package: String,
    pub bounds: Option<Bounds>,
    pub clickable: bool,
    pub enabled: bool,
    pub focusable: bool,
}

impl UiElement {
    /// Tap target; `None` when bounds were absent or malformed.
    pub fn center(&self) -> Option<(i32, i32)> {
        self.bounds.map(|b| b.center())
    }

    /// Whether the element is worth surfacing in an interactive-only
    /// listing. The `enabled` clause makes this nearly a pass-through
    /// on real dumps; retained for wire compatibility.
    pub fn is_interactive(&self) -> bool {
        self.clickable
            || self.focusable
            || self.enabled
            || !self.text.trim().is_empty()
            || !self.content_desc.trim().is_empty()
    }

    /// Short human-readable label for log lines and error messages.
    pub fn describe(&self) -> String {
        let label = if !self.text.is_empty() {
            &self.text
        } else if !self.content_desc.is_empty() {
            &self.content_desc
        } else {
            &self.resource_id
        };
        if label.is_empty() {
            self.class_name.clone()
        } else {
            format!("{} \"{}\"", self.class_name, label)
        }
    }
}
