//! Screenshot hand-off with an external renderer
//!
//! The engine writes `render-requests/request_{run_id}.json`; a renderer picks
//! it up and deposits `screenshots/screenshot_{run_id}.png`, writing it under
//! another name and renaming it into place. Waiting is bounded and
//! cancellable: a missing screenshot only means the visual branch is skipped.
//!
//! A consumed screenshot is moved to `screenshots/consumed/`, so a later
//! visual review of the same run waits for a fresh render.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use uxpal_config::Config;
use uxpal_llm::ImageInput;
use uxpal_utils::atomic_write::write_json_atomic;
use uxpal_utils::types::RunId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Completed,
}

/// A "render this JSON" request for the external renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotRequest {
    pub run_id: String,
    pub json_content: Value,
    pub status: RequestStatus,
    pub timestamp: String,
}

/// How a wait for a screenshot ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready(Utf8PathBuf),
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct ScreenshotHandoff {
    requests_dir: Utf8PathBuf,
    screenshots_dir: Utf8PathBuf,
    poll_interval: Duration,
    timeout: Duration,
}

impl ScreenshotHandoff {
    #[must_use]
    pub fn new(
        requests_dir: impl Into<Utf8PathBuf>,
        screenshots_dir: impl Into<Utf8PathBuf>,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            requests_dir: requests_dir.into(),
            screenshots_dir: screenshots_dir.into(),
            poll_interval: poll_interval.max(Duration::from_millis(10)),
            timeout,
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.requests_dir(),
            config.screenshots_dir(),
            config.poll_interval(),
            config.screenshot_timeout(),
        )
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn request_path(&self, run_id: &RunId) -> Utf8PathBuf {
        self.requests_dir.join(format!("request_{run_id}.json"))
    }

    #[must_use]
    pub fn screenshot_path(&self, run_id: &RunId) -> Utf8PathBuf {
        self.screenshots_dir.join(format!("screenshot_{run_id}.png"))
    }

    /// Where a screenshot goes once the critique has read it.
    #[must_use]
    pub fn consumed_path(&self, run_id: &RunId) -> Utf8PathBuf {
        self.screenshots_dir
            .join("consumed")
            .join(format!("screenshot_{run_id}.png"))
    }

    /// Read the screenshot for `run_id` and retire it to [`Self::consumed_path`].
    ///
    /// A screenshot that was read but could not be moved is still returned.
    pub fn consume_screenshot(&self, run_id: &RunId) -> Result<ImageInput> {
        let path = self.screenshot_path(run_id);
        let image = load_screenshot(&path)?;
        let retired = self.consumed_path(run_id);
        let moved = retired
            .parent()
            .map_or(Ok(()), std::fs::create_dir_all)
            .and_then(|()| std::fs::rename(&path, &retired));
        match moved {
            Ok(()) => debug!(from = %path, to = %retired, "Retired consumed screenshot"),
            Err(e) => warn!(path = %path, error = %e, "Could not retire consumed screenshot"),
        }
        Ok(image)
    }

    /// Write a pending request holding a snapshot of `json`.
    pub fn create_request(&self, run_id: &RunId, json: &Value) -> Result<ScreenshotRequest> {
        let request = ScreenshotRequest {
            run_id: run_id.to_string(),
            json_content: json.clone(),
            status: RequestStatus::Pending,
            timestamp: chrono::Local::now().to_rfc3339(),
        };
        let path = self.request_path(run_id);
        write_json_atomic(&path, &request)
            .with_context(|| format!("Failed to write screenshot request {path}"))?;
        info!(run_id = %run_id, path = %path, "Screenshot requested");
        Ok(request)
    }

    /// Load the request for `run_id`, if one was written.
    pub fn load_request(&self, run_id: &RunId) -> Result<Option<ScreenshotRequest>> {
        let path = self.request_path(run_id);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(Some(
                serde_json::from_str(&text).with_context(|| format!("Failed to parse {path}"))?,
            )),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {path}")),
        }
    }

    /// Mark the request for `run_id` as completed.
    pub fn complete_request(&self, run_id: &RunId) -> Result<()> {
        let Some(mut request) = self.load_request(run_id)? else {
            return Ok(());
        };
        request.status = RequestStatus::Completed;
        request.timestamp = chrono::Local::now().to_rfc3339();
        write_json_atomic(&self.request_path(run_id), &request)
    }

    /// Wait until the screenshot for `run_id` exists, the timeout passes or
    /// `cancel` fires. Nothing on disk is removed on any outcome.
    pub async fn wait_for_screenshot(
        &self,
        run_id: &RunId,
        cancel: &CancellationToken,
    ) -> WaitOutcome {
        let path = self.screenshot_path(run_id);
        let deadline = tokio::time::sleep_until(Instant::now() + self.timeout);
        tokio::pin!(deadline);
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(run_id = %run_id, path = %path, timeout_secs = self.timeout.as_secs(), "Waiting for screenshot");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!(run_id = %run_id, "Screenshot wait cancelled");
                    return WaitOutcome::Cancelled;
                }
                () = &mut deadline => {
                    info!(run_id = %run_id, timeout_secs = self.timeout.as_secs(), "No screenshot before timeout");
                    return WaitOutcome::TimedOut;
                }
                _ = ticker.tick() => {
                    if path.is_file() {
                        info!(run_id = %run_id, path = %path, "Screenshot available");
                        return WaitOutcome::Ready(path);
                    }
                }
            }
        }
    }
}

fn load_screenshot(path: &Utf8Path) -> Result<ImageInput> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read screenshot {path}"))?;
    Ok(ImageInput::png(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn handoff(temp: &TempDir, timeout: Duration) -> ScreenshotHandoff {
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        ScreenshotHandoff::new(
            root.join("render-requests"),
            root.join("screenshots"),
            Duration::from_secs(2),
            timeout,
        )
    }

    fn run_id() -> RunId {
        RunId::parse("20250101_120000").unwrap()
    }

    #[test]
    fn test_request_lifecycle() {
        let temp = TempDir::new().unwrap();
        let handoff = handoff(&temp, Duration::from_secs(300));
        let json = json!({"layoutContainer": {}, "items": []});

        let request = handoff.create_request(&run_id(), &json).unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
        assert!(handoff.request_path(&run_id()).ends_with("render-requests/request_20250101_120000.json"));

        handoff.complete_request(&run_id()).unwrap();
        let stored = handoff.load_request(&run_id()).unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::Completed);
        assert_eq!(stored.json_content, json);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_without_screenshot() {
        let temp = TempDir::new().unwrap();
        let handoff = handoff(&temp, Duration::from_secs(300));

        let started = Instant::now();
        let outcome = handoff.wait_for_screenshot(&run_id(), &CancellationToken::new()).await;

        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert!(started.elapsed() >= Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_sees_late_screenshot() {
        let temp = TempDir::new().unwrap();
        let handoff = handoff(&temp, Duration::from_secs(300));
        let path = handoff.screenshot_path(&run_id());

        let writer_path = path.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            std::fs::create_dir_all(writer_path.parent().unwrap()).unwrap();
            std::fs::write(&writer_path, b"png").unwrap();
        });

        let started = Instant::now();
        let outcome = handoff.wait_for_screenshot(&run_id(), &CancellationToken::new()).await;

        assert_eq!(outcome, WaitOutcome::Ready(path));
        assert!(started.elapsed() < Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_is_cancellable() {
        let temp = TempDir::new().unwrap();
        let handoff = handoff(&temp, Duration::from_secs(300));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });

        let outcome = handoff.wait_for_screenshot(&run_id(), &cancel).await;
        assert_eq!(outcome, WaitOutcome::Cancelled);
    }

    #[test]
    fn test_consume_reads_png_bytes_and_retires_file() {
        let temp = TempDir::new().unwrap();
        let handoff = handoff(&temp, Duration::from_secs(1));
        let path = handoff.screenshot_path(&run_id());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();

        let image = handoff.consume_screenshot(&run_id()).unwrap();

        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.data.len(), 4);
        assert!(!path.exists());
        assert_eq!(std::fs::read(handoff.consumed_path(&run_id())).unwrap().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consumed_screenshot_is_not_seen_again() {
        let temp = TempDir::new().unwrap();
        let handoff = handoff(&temp, Duration::from_secs(30));
        let path = handoff.screenshot_path(&run_id());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"first render").unwrap();
        handoff.consume_screenshot(&run_id()).unwrap();

        let outcome = handoff.wait_for_screenshot(&run_id(), &CancellationToken::new()).await;

        assert_eq!(outcome, WaitOutcome::TimedOut);
    }

    #[test]
    fn test_consume_missing_screenshot_fails() {
        let temp = TempDir::new().unwrap();
        let handoff = handoff(&temp, Duration::from_secs(1));
        assert!(handoff.consume_screenshot(&run_id()).is_err());
    }
}
