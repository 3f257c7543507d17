//! Hierarchy Extractor — pulls the on-device accessibility tree as XML
//! and flattens it into [`UiElement`] records.
//!
//! The dump tool is flaky across OEM builds, so extraction walks a
//! ladder of strategies:
//!
//! ```text
//! 1. uiautomator dump /dev/stdout            (fastest, often broken)
//! 2. dump to /sdcard/ui_dump_<rand>.xml, cat  (most compatible)
//! 3. dump to /data/local/tmp/..., cat         (sdcard-less devices)
//! ```
//!
//! Output is accepted only when it starts with the XML declaration;
//! remote temp files are removed best-effort after reading.

use tracing::{debug, warn};

use crate::adb::AdbGateway;
use crate::error::{BridgeError, Result};
use crate::ui::element::{Bounds, UiElement};

/// Extracts fresh UI snapshots from a device. Holds no tree state.
#[derive(Clone)]
pub struct HierarchyExtractor {
    gateway: AdbGateway,
}

impl HierarchyExtractor {
    pub fn new(gateway: AdbGateway) -> Self {
        Self { gateway }
    }

    /// Dump the current hierarchy XML, trying each strategy in order.
    pub async fn dump(&self, device: &str) -> Result<String> {
        // Rung 1: direct stdout dump.
        if let Ok(out) = self
            .gateway
            .shell(device, "uiautomator dump /dev/stdout 2>/dev/null")
            .await
        {
            if out.success() && is_xml(&out.stdout) {
                return Ok(out.stdout);
            }
        }
        debug!(device, "stdout dump rejected; trying file strategies");

        // Rungs 2 and 3: dump to a remote file, read it back, clean up.
        let suffix = short_suffix();
        for dir in ["/sdcard", "/data/local/tmp"] {
            let path = format!("{dir}/ui_dump_{suffix}.xml");
            match self.dump_via_file(device, &path).await {
                Ok(Some(xml)) => return Ok(xml),
                Ok(None) => continue,
                Err(e) => {
                    warn!(device, path, "file dump strategy failed: {e}");
                    continue;
                }
            }
        }

        Err(BridgeError::HierarchyUnavailable)
    }

    async fn dump_via_file(&self, device: &str, path: &str) -> Result<Option<String>> {
        let dump = self
            .gateway
            .shell(device, &format!("uiautomator dump {path}"))
            .await?;
        if !dump.success() {
            return Ok(None);
        }

        let read = self.gateway.shell(device, &format!("cat {path}")).await;
        // Remove the temp file regardless of how the read went.
        let _ = self.gateway.shell(device, &format!("rm {path}")).await;

        match read {
            Ok(out) if out.success() && is_xml(&out.stdout) => Ok(Some(out.stdout)),
            _ => Ok(None),
        }
    }

    /// Dump and parse in one call, optionally keeping only elements
    /// that pass the interactive filter.
    pub async fn elements(&self, device: &str, interactive_only: bool) -> Result<Vec<UiElement>> {
        let xml = self.dump(device).await?;
        let mut elements = parse_hierarchy(&xml)?;
        if interactive_only {
            elements.retain(UiElement::is_interactive);
        }
        Ok(elements)
    }
}

fn is_xml(s: &str) -> bool {
    s.trim_start().starts_with("<?xml")
}

fn short_suffix() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

// ── XML parsing ───────────────────────────────────────────────────

/// Flatten a hierarchy dump into element records, in document order.
/// The `hierarchy` container node and class-less nodes are discarded.
pub fn parse_hierarchy(xml: &str) -> Result<Vec<UiElement>> {
    let doc = roxmltree::Document::parse(xml)
        .map_err(|e| BridgeError::InvalidHierarchy(e.to_string()))?;

    let mut elements = Vec::new();
    for node in doc.descendants() {
        if !node.is_element() || node.tag_name().name() == "hierarchy" {
            continue;
        }
        let class_name = node.attribute("class").unwrap_or_default();
        if class_name.is_empty() {
            continue;
        }
        elements.push(UiElement {
            class_name: class_name.to_string(),
            resource_id: attr(&node, "resource-id"),
            text: attr(&node, "text"),
            content_desc: attr(&node, "content-desc"),
            package: attr(&node, "package"),
            bounds: node.attribute("bounds").and_then(Bounds::parse),
            clickable: flag(&node, "clickable", false),
            enabled: flag(&node, "enabled", true),
            focusable: flag(&node, "focusable", false),
        });
    }
    Ok(elements)
}

fn attr(node: &roxmltree::Node, name: &str) -> String {
    node.attribute(name).unwrap_or_default().to_string()
}

fn flag(node: &roxmltree::Node, name: &str, default: bool) -> bool {
    match node.attribute(name) {
        Some(v) => v == "true",
        None => default,
    }
}
