//! Input injection: taps, swipes, key events and two-tier text entry.
//!
//! Text goes through a base64 pipe first (robust against shell
//! metacharacters and non-ASCII), then falls back to an escaped
//! direct `input text` call.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::debug;

use crate::adb::AdbGateway;
use crate::error::Result;

impl AdbGateway {
    /// Tap at screen coordinates.
    pub async fn tap(&self, device: &str, x: i32, y: i32) -> Result<()> {
        self.shell_ok(device, &format!("input tap {x} {y}")).await
    }

    /// Swipe between two points over `duration_ms` milliseconds.
    pub async fn swipe(
        &self,
        device: &str,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        duration_ms: u32,
    ) -> Result<()> {
        let cmd = format!("input swipe {x1} {y1} {x2} {y2} {duration_ms}");
        self.shell_ok(device, &cmd).await
    }

    /// Long-press: a swipe with equal endpoints held for the duration.
    pub async fn long_press(&self, device: &str, x: i32, y: i32, duration_ms: u32) -> Result<()> {
        self.swipe(device, x, y, x, y, duration_ms).await
    }

    /// Vertical scroll by a signed delta (positive scrolls content up).
    pub async fn scroll(&self, device: &str, x: i32, y: i32, delta: i32) -> Result<()> {
        self.swipe(device, x, y, x, y - delta, 300).await
    }

    /// Press a key by symbolic name or numeric code.
    pub async fn press_key(&self, device: &str, key: &str) -> Result<()> {
        let code = resolve_keycode(key);
        self.shell_ok(device, &format!("input keyevent {code}")).await
    }

    /// Type text into the focused field.
    ///
    /// First tier pipes a base64 payload through the device-side
    /// decoder; if that fails (old devices lack the decode path), the
    /// second tier injects the text directly with shell escaping.
    pub async fn type_text(&self, device: &str, text: &str) -> Result<()> {
        let encoded = BASE64.encode(text.as_bytes());
        let piped = format!("echo '{encoded}' | base64 -d | input text");
        match self.shell(device, &piped).await {
            Ok(out) if out.success() => return Ok(()),
            Ok(_) | Err(_) => {
                debug!(device, "base64 text path failed; falling back to escaped injection");
            }
        }
        let escaped = escape_shell_text(text);
        self.shell_ok(device, &format!("input text '{escaped}'")).await
    }
}

// ── Key codes ─────────────────────────────────────────────────────

fn named_keycode(name: &str) -> Option<u16> {
    let code = match name {
        "HOME" => 3,
        "BACK" => 4,
        "VOLUME_UP" => 24,
        "VOLUME_DOWN" => 25,
        "POWER" => 26,
        "CAMERA" => 27,
        "TAB" => 61,
        "SPACE" => 62,
        "ENTER" => 66,
        "DELETE" | "DEL" => 67,
        "MENU" => 82,
        "SEARCH" => 84,
        "ESCAPE" => 111,
        "APP_SWITCH" => 187,
        "KEYCODE_0" => 7,
        "KEYCODE_1" => 8,
        "KEYCODE_2" => 9,
        "KEYCODE_3" => 10,
        "KEYCODE_4" => 11,
        "KEYCODE_5" => 12,
        "KEYCODE_6" => 13,
        "KEYCODE_7" => 14,
        "KEYCODE_8" => 15,
        "KEYCODE_9" => 16,
        _ => return None,
    };
    Some(code)
}

/// Resolve a key argument to what `input keyevent` accepts: a numeric
/// code for known names, the digits themselves for numeric input, or
/// a `KEYCODE_`-prefixed passthrough for anything unrecognized.
pub fn resolve_keycode(key: &str) -> String {
    let upper = key.to_ascii_uppercase();
    if let Some(code) = named_keycode(&upper) {
        return code.to_string();
    }
    let stripped = upper.strip_prefix("KEYCODE_");
    if let Some(name) = stripped {
        if let Some(code) = named_keycode(name) {
            return code.to_string();
        }
    }
    let candidate = stripped.unwrap_or(&upper);
    if !candidate.is_empty() && candidate.chars().all(|c| c.is_ascii_digit()) {
        return candidate.to_string();
    }
    format!("KEYCODE_{candidate}")
}

/// Escape text for single-quoted `input text` injection.
pub fn escape_shell_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '$' => out.push_str("\\$"),
            '`' => out.push_str("\\`"),
            '"' => out.push_str("\\\""),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adb::{CommandRunner, RawOutput};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct RecordingRunner {
        fail_first: bool,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CommandRunner for RecordingRunner {
        async fn run_raw(
            &self,
            _device: Option<&str>,
            args: &[&str],
            _timeout: Duration,
        ) -> crate::error::Result<RawOutput> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(args.join(" "));
            let exit_code = if self.fail_first && calls.len() == 1 { 1 } else { 0 };
            Ok(RawOutput {
                stdout: Vec::new(),
                stderr: Vec::new(),
                exit_code,
            })
        }
    }

    fn gateway(fail_first: bool) -> (AdbGateway, Arc<RecordingRunner>) {
        let runner = Arc::new(RecordingRunner {
            fail_first,
            calls: Mutex::new(Vec::new()),
        });
        (AdbGateway::with_runner(runner.clone()), runner)
    }

    #[tokio::test]
    async fn type_text_prefers_base64_pipe() {
        let (gw, runner) = gateway(false);
        gw.type_text("serial", "hello world").await.unwrap();

        let calls = runner.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].contains("base64 -d | input text"));
        assert!(calls[0].contains(&BASE64.encode(b"hello world")));
    }

    #[tokio::test]
    async fn type_text_falls_back_to_escaped_injection() {
        let (gw, runner) = gateway(true);
        gw.type_text("serial", "it's $5").await.unwrap();

        let calls = runner.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].contains("input text 'it\\'s \\$5'"));
    }

    #[tokio::test]
    async fn long_press_is_a_stationary_swipe() {
        let (gw, runner) = gateway(false);
        gw.long_press("serial", 100, 200, 1000).await.unwrap();

        let calls = runner.calls.lock().unwrap().clone();
        assert_eq!(calls, vec!["shell input swipe 100 200 100 200 1000"]);
    }

    #[tokio::test]
    async fn scroll_is_a_vertical_swipe() {
        let (gw, runner) = gateway(false);
        gw.scroll("serial", 540, 1200, 400).await.unwrap();

        let calls = runner.calls.lock().unwrap().clone();
        assert_eq!(calls, vec!["shell input swipe 540 1200 540 800 300"]);
    }

    #[test]
    fn named_keys_resolve_to_codes() {
        assert_eq!(resolve_keycode("BACK"), "4");
        assert_eq!(resolve_keycode("back"), "4");
        assert_eq!(resolve_keycode("home"), "3");
        assert_eq!(resolve_keycode("ENTER"), "66");
    }

    #[test]
    fn prefixed_names_are_stripped() {
        assert_eq!(resolve_keycode("KEYCODE_BACK"), "4");
        assert_eq!(resolve_keycode("KEYCODE_5"), "12");
    }

    #[test]
    fn numeric_codes_pass_through() {
        assert_eq!(resolve_keycode("66"), "66");
        assert_eq!(resolve_keycode("KEYCODE_223"), "223");
    }

    #[test]
    fn unknown_names_keep_keycode_prefix() {
        assert_eq!(resolve_keycode("WAKEUP"), "KEYCODE_WAKEUP");
        assert_eq!(resolve_keycode("KEYCODE_WAKEUP"), "KEYCODE_WAKEUP");
    }

    #[test]
    fn escaping_covers_shell_metacharacters() {
        assert_eq!(escape_shell_text("a$b"), "a\\$b");
        assert_eq!(escape_shell_text("it's"), "it\\'s");
        assert_eq!(escape_shell_text("line\nbreak"), "line\\nbreak");
        assert_eq!(escape_shell_text("back\\slash"), "back\\\\slash");
        assert_eq!(escape_shell_text("plain"), "plain");
    }
}
