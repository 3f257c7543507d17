//! Streaming Engine — one capture loop per device, demand-driven.
//!
//! A device is either idle (no loop) or capturing (exactly one loop).
//! The first subscriber starts the loop; the last one leaving cancels
//! it, and the cancellation is acknowledged by awaiting the loop task
//! before the per-device slot is reused. Repeated capture failures
//! stop the loop on their own after notifying every subscriber once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::future::join_all;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adb::AdbGateway;
use crate::error::{BridgeError, Result};
use crate::hub::{ConnectionHandle, ConnectionId, ServerEvent};
use crate::stream::transcode::{FrameTranscoder, TranscodeConfig};

/// Streaming parameters.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Upper bound on the frame rate; capture latency sets the floor.
    pub target_fps: u32,
    /// Consecutive capture failures before the stream gives up.
    pub max_consecutive_failures: u32,
    /// Pause between retries while below the failure threshold.
    pub retry_delay: Duration,
    /// Frame transcoding parameters.
    pub transcode: TranscodeConfig,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            target_fps: 60,
            max_consecutive_failures: 5,
            retry_delay: Duration::from_millis(50),
            transcode: TranscodeConfig::default(),
        }
    }
}

/// What a new subscriber is told about the stream it joined.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    /// Whether this subscription started the capture loop.
    pub newly_started: bool,
    pub method: &'static str,
    pub format: &'static str,
    pub fps: u32,
}

// ── Session bookkeeping ───────────────────────────────────────────

struct StreamSession {
    subscribers: HashMap<ConnectionId, ConnectionHandle>,
    /// Snapshot of the subscriber set, observed by the capture loop.
    roster: watch::Sender<Vec<ConnectionHandle>>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl StreamSession {
    fn publish(&self) {
        let _ = self
            .roster
            .send(self.subscribers.values().cloned().collect());
    }
}

enum Removal {
    NotFound,
    Remaining,
    Stopped {
        cancel: CancellationToken,
        handle: JoinHandle<()>,
    },
}

// ── Engine ────────────────────────────────────────────────────────

/// Owns every per-device stream session. All transitions go through
/// the sessions lock; capture loops never touch the map directly.
pub struct StreamEngine {
    gateway: AdbGateway,
    config: StreamConfig,
    sessions: Mutex<HashMap<String, StreamSession>>,
}

impl StreamEngine {
    pub fn new(gateway: AdbGateway, config: StreamConfig) -> Arc<Self> {
        Arc::new(Self {
            gateway,
            config,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    /// Add a subscriber, starting the capture loop on the idle→capturing
    /// transition. Two concurrent calls for the same device can never
    /// race a second loop into existence — the transition happens under
    /// the sessions lock.
    pub async fn subscribe(self: &Arc<Self>, device: &str, conn: ConnectionHandle) -> StreamInfo {
        let mut sessions = self.sessions.lock().await;
        let newly_started = match sessions.get_mut(device) {
            Some(session) => {
                session.subscribers.insert(conn.id(), conn);
                session.publish();
                false
            }
            None => {
                let (roster_tx, roster_rx) = watch::channel(vec![conn.clone()]);
                let cancel = CancellationToken::new();
                let mut subscribers = HashMap::new();
                subscribers.insert(conn.id(), conn);
                let handle = tokio::spawn(capture_loop(
                    self.clone(),
                    device.to_string(),
                    cancel.clone(),
                    roster_rx,
                ));
                sessions.insert(
                    device.to_string(),
                    StreamSession {
                        subscribers,
                        roster: roster_tx,
                        cancel,
                        handle,
                    },
                );
                info!(device, "capture loop started");
                true
            }
        };
        StreamInfo {
            newly_started,
            method: "screenshot",
            format: "jpeg",
            fps: self.config.target_fps,
        }
    }

    /// Remove a subscriber. When the last one leaves, the loop is
    /// cancelled and awaited before this returns, so the device slot
    /// is immediately reusable.
    pub async fn unsubscribe(&self, device: &str, id: ConnectionId) {
        if let Removal::Stopped { cancel, handle } = self.remove_subscriber(device, id).await {
            cancel.cancel();
            let _ = handle.await;
            info!(device, "capture loop stopped");
        }
    }

    /// Remove a disconnected client from every stream it was watching.
    pub async fn drop_connection(&self, id: ConnectionId) {
        let devices: Vec<String> = self.sessions.lock().await.keys().cloned().collect();
        for device in devices {
            self.unsubscribe(&device, id).await;
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn subscriber_count(&self, device: &str) -> usize {
        self.sessions
            .lock()
            .await
            .get(device)
            .map_or(0, |s| s.subscribers.len())
    }

    /// Shared removal path. The lock is released before the caller
    /// cancels or awaits anything.
    async fn remove_subscriber(&self, device: &str, id: ConnectionId) -> Removal {
        let mut sessions = self.sessions.lock().await;
        let emptied = {
            let Some(session) = sessions.get_mut(device) else {
                return Removal::NotFound;
            };
            if session.subscribers.remove(&id).is_none() {
                return Removal::NotFound;
            }
            if session.subscribers.is_empty() {
                true
            } else {
                session.publish();
                false
            }
        };
        if emptied {
            match sessions.remove(device) {
                Some(session) => Removal::Stopped {
                    cancel: session.cancel,
                    handle: session.handle,
                },
                None => Removal::NotFound,
            }
        } else {
            Removal::Remaining
        }
    }

    /// Loop-internal prune after a failed delivery. Must not await the
    /// loop's own join handle, so a stop here only cancels and detaches;
    /// the caller exits on the next cancellation check.
    async fn prune_subscriber(&self, device: &str, id: ConnectionId) {
        if let Removal::Stopped { cancel, handle } = self.remove_subscriber(device, id).await {
            cancel.cancel();
            drop(handle);
            info!(device, "capture loop stopping: last subscriber pruned");
        }
    }

    /// Tear down a session whose loop is exiting on its own after
    /// hitting the failure threshold. A subscriber can slip in between
    /// the loop's error broadcast and this call; anyone not in
    /// `notified` still gets the error event instead of a silent drop.
    async fn finish_faulted(&self, device: &str, notified: &[ConnectionId]) {
        let session = self.sessions.lock().await.remove(device);
        let Some(session) = session else {
            return;
        };
        warn!(device, "stream stopped after repeated capture failures");

        let message = BridgeError::StreamCaptureFailed {
            failures: self.config.max_consecutive_failures,
        }
        .to_string();
        let late: Vec<&ConnectionHandle> = session
            .subscribers
            .values()
            .filter(|h| !notified.contains(&h.id()))
            .collect();
        join_all(late.iter().map(|h| {
            h.send(ServerEvent::Error {
                message: message.clone(),
            })
        }))
        .await;
    }
}

// ── Capture loop ──────────────────────────────────────────────────

/// Time left in the frame budget after the work done this iteration.
fn frame_budget(period: Duration, elapsed: Duration) -> Duration {
    period.saturating_sub(elapsed)
}

async fn capture_loop(
    engine: Arc<StreamEngine>,
    device: String,
    cancel: CancellationToken,
    roster: watch::Receiver<Vec<ConnectionHandle>>,
) {
    let period = Duration::from_secs_f64(1.0 / f64::from(engine.config.target_fps.max(1)));
    let transcoder = Arc::new(FrameTranscoder::new(engine.config.transcode.clone()));
    let mut failures = 0u32;

    loop {
        if cancel.is_cancelled() {
            break;
        }
        let frame_start = Instant::now();

        match capture_frame(&engine, &transcoder, &device).await {
            Ok(screenshot) => {
                failures = 0;
                let event = ServerEvent::ScreenUpdated {
                    device_id: device.clone(),
                    screenshot,
                    format: "jpeg".into(),
                };
                let targets = roster.borrow().clone();
                // Delivery stays cancellable: a stalled subscriber
                // channel must not hold the loop across a stop request.
                let results = tokio::select! {
                    _ = cancel.cancelled() => break,
                    results = join_all(targets.iter().map(|t| t.send(event.clone()))) => results,
                };
                for (target, result) in targets.iter().zip(results) {
                    if result.is_err() {
                        debug!(device, id = target.id(), "pruning dead subscriber");
                        engine.prune_subscriber(&device, target.id()).await;
                    }
                }
            }
            Err(e) => {
                failures += 1;
                debug!(device, failures, "frame capture failed: {e}");
                if failures >= engine.config.max_consecutive_failures {
                    let message = BridgeError::StreamCaptureFailed { failures }.to_string();
                    let targets = roster.borrow().clone();
                    join_all(targets.iter().map(|t| {
                        t.send(ServerEvent::Error {
                            message: message.clone(),
                        })
                    }))
                    .await;
                    let told: Vec<ConnectionId> = targets.iter().map(|t| t.id()).collect();
                    engine.finish_faulted(&device, &told).await;
                    return;
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(engine.config.retry_delay) => {}
                }
            }
        }

        let budget = frame_budget(period, frame_start.elapsed());
        if !budget.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(budget) => {}
            }
        }
    }
    debug!(device, "capture loop exited");
}

/// One frame: capture on the async subprocess path, transcode on a
/// blocking thread, encode for transport.
async fn capture_frame(
    engine: &StreamEngine,
    transcoder: &Arc<FrameTranscoder>,
    device: &str,
) -> Result<String> {
    let raw = engine.gateway.screencap(device).await?;
    if raw.is_empty() {
        return Err(BridgeError::Other(format!("empty frame from {device}")));
    }
    let transcoder = transcoder.clone();
    let frame = tokio::task::spawn_blocking(move || transcoder.transcode(&raw))
        .await
        .map_err(|e| BridgeError::Other(format!("transcode task failed: {e}")))??;
    Ok(BASE64.encode(&frame.data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adb::{CommandRunner, RawOutput};
    use async_trait::async_trait;
    use std::io::Cursor;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    const RECV_BUDGET: Duration = Duration::from_secs(5);

    fn png_frame() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(32, 64, image::Rgb([200, 40, 40]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    /// Always returns the same valid PNG frame.
    struct FrameRunner {
        frame: Vec<u8>,
    }

    #[async_trait]
    impl CommandRunner for FrameRunner {
        async fn run_raw(
            &self,
            _device: Option<&str>,
            _args: &[&str],
            _timeout: Duration,
        ) -> Result<RawOutput> {
            Ok(RawOutput {
                stdout: self.frame.clone(),
                stderr: Vec::new(),
                exit_code: 0,
            })
        }
    }

    /// Every capture fails.
    struct BrokenRunner;

    #[async_trait]
    impl CommandRunner for BrokenRunner {
        async fn run_raw(
            &self,
            _device: Option<&str>,
            _args: &[&str],
            _timeout: Duration,
        ) -> Result<RawOutput> {
            Ok(RawOutput {
                stdout: Vec::new(),
                stderr: b"device offline".to_vec(),
                exit_code: 1,
            })
        }
    }

    fn fast_config() -> StreamConfig {
        StreamConfig {
            target_fps: 500,
            max_consecutive_failures: 5,
            retry_delay: Duration::from_millis(1),
            transcode: TranscodeConfig::default(),
        }
    }

    fn working_engine() -> Arc<StreamEngine> {
        let gateway = AdbGateway::with_runner(Arc::new(FrameRunner { frame: png_frame() }));
        StreamEngine::new(gateway, fast_config())
    }

    fn broken_engine() -> Arc<StreamEngine> {
        StreamEngine::new(AdbGateway::with_runner(Arc::new(BrokenRunner)), fast_config())
    }

    fn subscriber(id: ConnectionId) -> (ConnectionHandle, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(64);
        (ConnectionHandle::new(id, tx), rx)
    }

    async fn next_event(rx: &mut mpsc::Receiver<ServerEvent>) -> ServerEvent {
        timeout(RECV_BUDGET, rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn subscriber_receives_jpeg_frames() {
        let engine = working_engine();
        let (conn, mut rx) = subscriber(1);

        let info = engine.subscribe("serial", conn).await;
        assert!(info.newly_started);
        assert_eq!(info.method, "screenshot");
        assert_eq!(info.format, "jpeg");

        match next_event(&mut rx).await {
            ServerEvent::ScreenUpdated {
                device_id,
                screenshot,
                format,
            } => {
                assert_eq!(device_id, "serial");
                assert_eq!(format, "jpeg");
                let bytes = BASE64.decode(screenshot).unwrap();
                assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
            }
            other => panic!("expected frame, got {other:?}"),
        }

        engine.unsubscribe("serial", 1).await;
        assert_eq!(engine.session_count().await, 0);
    }

    #[tokio::test]
    async fn one_loop_serves_all_subscribers() {
        let engine = working_engine();
        let (c1, mut rx1) = subscriber(1);
        let (c2, mut rx2) = subscriber(2);
        let (c3, mut rx3) = subscriber(3);

        let i1 = engine.subscribe("serial", c1).await;
        let i2 = engine.subscribe("serial", c2).await;
        let i3 = engine.subscribe("serial", c3).await;
        assert!(i1.newly_started);
        assert!(!i2.newly_started);
        assert!(!i3.newly_started);

        assert_eq!(engine.session_count().await, 1);
        assert_eq!(engine.subscriber_count("serial").await, 3);

        for rx in [&mut rx1, &mut rx2, &mut rx3] {
            assert!(matches!(
                next_event(rx).await,
                ServerEvent::ScreenUpdated { .. }
            ));
        }

        // Two leave; the loop keeps running for the third.
        engine.unsubscribe("serial", 1).await;
        engine.unsubscribe("serial", 2).await;
        drop(rx1);
        drop(rx2);
        assert_eq!(engine.session_count().await, 1);
        assert!(matches!(
            next_event(&mut rx3).await,
            ServerEvent::ScreenUpdated { .. }
        ));

        engine.unsubscribe("serial", 3).await;
        assert_eq!(engine.session_count().await, 0);
    }

    #[tokio::test]
    async fn separate_devices_get_separate_loops() {
        let engine = working_engine();
        let (c1, _rx1) = subscriber(1);
        let (c2, _rx2) = subscriber(2);

        assert!(engine.subscribe("serial-a", c1).await.newly_started);
        assert!(engine.subscribe("serial-b", c2).await.newly_started);
        assert_eq!(engine.session_count().await, 2);

        engine.drop_connection(1).await;
        assert_eq!(engine.session_count().await, 1);
        engine.drop_connection(2).await;
        assert_eq!(engine.session_count().await, 0);
    }

    #[tokio::test]
    async fn failure_threshold_notifies_once_and_stops() {
        let engine = broken_engine();
        let (c1, mut rx1) = subscriber(1);
        let (c2, mut rx2) = subscriber(2);

        engine.subscribe("serial", c1).await;
        engine.subscribe("serial", c2).await;

        for rx in [&mut rx1, &mut rx2] {
            match next_event(rx).await {
                ServerEvent::Error { message } => {
                    assert!(message.contains("5"), "unexpected message: {message}");
                }
                other => panic!("expected error event, got {other:?}"),
            }
        }

        // The loop tears its own session down; nothing further arrives.
        timeout(RECV_BUDGET, async {
            while engine.session_count().await != 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("session was not torn down");
        assert!(rx1.try_recv().is_err());

        // The device is immediately re-subscribable.
        let (c3, _rx3) = subscriber(3);
        assert!(engine.subscribe("serial", c3).await.newly_started);
    }

    #[tokio::test]
    async fn dead_subscribers_are_pruned_mid_stream() {
        let engine = working_engine();
        let (c1, rx1) = subscriber(1);
        let (c2, mut rx2) = subscriber(2);

        engine.subscribe("serial", c1).await;
        engine.subscribe("serial", c2).await;
        drop(rx1);

        timeout(RECV_BUDGET, async {
            while engine.subscriber_count("serial").await != 1 {
                // Keep the survivor's channel drained while waiting.
                let _ = rx2.try_recv();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("dead subscriber was not pruned");

        // The survivor still gets frames.
        assert!(matches!(
            next_event(&mut rx2).await,
            ServerEvent::ScreenUpdated { .. }
        ));

        engine.unsubscribe("serial", 2).await;
        assert_eq!(engine.session_count().await, 0);
    }

    #[tokio::test]
    async fn pacing_caps_the_frame_rate() {
        // Capture and transcode are near-instant here, so pacing is the
        // only thing holding the loop back.
        let gateway = AdbGateway::with_runner(Arc::new(FrameRunner { frame: png_frame() }));
        let engine = StreamEngine::new(
            gateway,
            StreamConfig {
                target_fps: 40,
                ..fast_config()
            },
        );
        let (conn, mut rx) = subscriber(1);
        engine.subscribe("serial", conn).await;

        let window = Duration::from_millis(500);
        let deadline = tokio::time::Instant::now() + window;
        let mut frames = 0u32;
        loop {
            let now = tokio::time::Instant::now();
            if now >= deadline {
                break;
            }
            match timeout(deadline - now, rx.recv()).await {
                Ok(Some(ServerEvent::ScreenUpdated { .. })) => frames += 1,
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => break,
            }
        }
        engine.unsubscribe("serial", 1).await;

        // 40 fps over half a second allows 20 frames; one more may
        // straddle the window edge. The bound is an upper one only —
        // a slow machine produces fewer, never more.
        assert!(frames <= 21, "got {frames} frames in {window:?}");
        assert!(frames >= 1, "no frames at all");
    }

    #[tokio::test]
    async fn fault_teardown_notifies_subscribers_missed_by_the_broadcast() {
        // Park the loop in its first retry sleep so teardown can be
        // driven directly, as if the subscriber joined after the
        // threshold error went out.
        let engine = StreamEngine::new(
            AdbGateway::with_runner(Arc::new(BrokenRunner)),
            StreamConfig {
                retry_delay: Duration::from_secs(60),
                ..fast_config()
            },
        );
        let (conn, mut rx) = subscriber(1);
        engine.subscribe("serial", conn).await;

        engine.finish_faulted("serial", &[]).await;
        assert_eq!(engine.session_count().await, 0);

        match next_event(&mut rx).await {
            ServerEvent::Error { message } => {
                assert!(message.contains("capture failed"), "message: {message}");
            }
            other => panic!("expected error event, got {other:?}"),
        }
    }

    #[test]
    fn frame_budget_never_goes_negative() {
        let period = Duration::from_millis(16);
        assert_eq!(
            frame_budget(period, Duration::from_millis(4)),
            Duration::from_millis(12)
        );
        assert_eq!(frame_budget(period, Duration::from_millis(40)), Duration::ZERO);
    }
}
