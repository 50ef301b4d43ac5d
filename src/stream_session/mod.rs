//! StreamSession - Viewing Session State Machine
//!
//! ## Responsibilities
//!
//! - Track the page's session through Idle, Starting, Live and Stopped
//! - Drive backend start/stop calls for the selected source kind
//! - Hand the poller its start/stop moments for each transition
//!
//! Source selection is allowed from Idle, Stopped and Live. Every selection
//! opens a new epoch; a start call still in flight when a newer selection
//! or a stop arrives completes against a stale epoch and is discarded.

use crate::alert_poller::AlertPoller;
use crate::error::{Error, Result};
use crate::presentation_hub::{HubEvent, PresentationHub};
use crate::stream_gateway::{validate_rtsp_url, StreamGateway};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Default grace period between a video upload going live and the first
/// alert poll. Covers the backend's write of its first alert records;
/// a heuristic, not a guarantee.
pub const DEFAULT_VIDEO_POLL_DELAY_MS: u64 = 1500;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Starting,
    Live,
    Stopped,
}

/// Kind of stream source the operator selected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    File,
    Webcam,
    Rtsp,
}

/// Internal session state
struct SessionState {
    status: SessionStatus,
    locator: Option<String>,
    kind: Option<SourceKind>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            status: SessionStatus::Idle,
            locator: None,
            kind: None,
        }
    }
}

/// StreamSession instance
pub struct StreamSession {
    gateway: Arc<StreamGateway>,
    poller: Arc<AlertPoller>,
    hub: Arc<PresentationHub>,
    state: RwLock<SessionState>,
    epoch: Arc<AtomicU64>,
    video_poll_delay_ms: u64,
    deferred_poll: Mutex<Option<JoinHandle<()>>>,
}

impl StreamSession {
    /// Create new StreamSession
    pub fn new(
        gateway: Arc<StreamGateway>,
        poller: Arc<AlertPoller>,
        hub: Arc<PresentationHub>,
        video_poll_delay_ms: u64,
    ) -> Self {
        Self {
            gateway,
            poller,
            hub,
            state: RwLock::new(SessionState::default()),
            epoch: Arc::new(AtomicU64::new(0)),
            video_poll_delay_ms,
            deferred_poll: Mutex::new(None),
        }
    }

    // ========================================
    // Source selection
    // ========================================

    /// Upload a video file and go live on its processed stream.
    ///
    /// Polling starts after `video_poll_delay_ms` rather than immediately.
    pub async fn select_video(&self, path: &Path) -> Result<()> {
        if path.as_os_str().is_empty() {
            return Err(Error::Validation("Video file path is required".to_string()));
        }

        let epoch = self.begin_start(SourceKind::File).await;
        let started = self
            .gateway
            .start_video(path)
            .await
            .and_then(|resp| self.gateway.resolve_video_locator(&resp));

        match started {
            Ok(locator) => self.complete_start(epoch, SourceKind::File, locator).await,
            Err(e) => self.fail_start(epoch, e).await,
        }
    }

    /// Start webcam capture and go live on the shared capture stream
    pub async fn select_webcam(&self) -> Result<()> {
        let epoch = self.begin_start(SourceKind::Webcam).await;

        match self.gateway.start_webcam().await {
            Ok(()) => {
                let locator = self.gateway.webcam_stream_locator();
                self.complete_start(epoch, SourceKind::Webcam, locator).await
            }
            Err(e) => self.fail_start(epoch, e).await,
        }
    }

    /// Go live on an RTSP camera.
    ///
    /// The URL is validated locally and rejected before any state change;
    /// no backend start call exists for RTSP, requesting the locator is
    /// what starts the stream.
    pub async fn select_rtsp(&self, rtsp_url: &str) -> Result<()> {
        validate_rtsp_url(rtsp_url)?;

        let epoch = self.begin_start(SourceKind::Rtsp).await;
        let locator = self.gateway.rtsp_stream_locator(rtsp_url);
        self.complete_start(epoch, SourceKind::Rtsp, locator).await
    }

    // ========================================
    // Stop
    // ========================================

    /// Stop the active session. Safe no-op when nothing was started.
    ///
    /// The backend stop call is best-effort; its failure is logged and
    /// swallowed, the session still ends up Stopped.
    pub async fn stop(&self) {
        self.cancel_deferred_poll();

        let proceed = {
            let mut state = self.state.write().await;
            match state.status {
                SessionStatus::Idle | SessionStatus::Stopped => false,
                SessionStatus::Starting | SessionStatus::Live => {
                    self.epoch.fetch_add(1, Ordering::SeqCst);
                    state.status = SessionStatus::Stopped;
                    state.locator = None;
                    state.kind = None;
                    true
                }
            }
        };
        if !proceed {
            tracing::debug!("Stop requested with no active session");
            return;
        }

        self.poller.stop().await;
        self.hub
            .broadcast(HubEvent::SessionStatusChanged(SessionStatus::Stopped))
            .await;

        if let Err(e) = self.gateway.stop_capture().await {
            tracing::warn!(error = %e, "Backend stop failed - ignoring");
        }
        tracing::info!("Stream session stopped");
    }

    // ========================================
    // Accessors
    // ========================================

    pub async fn status(&self) -> SessionStatus {
        self.state.read().await.status
    }

    /// Locator of the live annotated stream, when one is active
    pub async fn stream_locator(&self) -> Option<String> {
        self.state.read().await.locator.clone()
    }

    pub async fn source_kind(&self) -> Option<SourceKind> {
        self.state.read().await.kind
    }

    // ========================================
    // Transition internals
    // ========================================

    /// Enter Starting under a fresh epoch, invalidating older attempts
    async fn begin_start(&self, kind: SourceKind) -> u64 {
        self.cancel_deferred_poll();

        let epoch = {
            let mut state = self.state.write().await;
            let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            state.status = SessionStatus::Starting;
            state.locator = None;
            state.kind = Some(kind);
            epoch
        };

        tracing::info!(kind = ?kind, "Starting stream session");
        self.hub
            .broadcast(HubEvent::SessionStatusChanged(SessionStatus::Starting))
            .await;
        epoch
    }

    /// Enter Live, unless a newer selection or stop owns the session now
    async fn complete_start(&self, epoch: u64, kind: SourceKind, locator: String) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if self.epoch.load(Ordering::SeqCst) != epoch {
                tracing::debug!(kind = ?kind, "Discarding superseded stream start");
                return Ok(());
            }
            state.status = SessionStatus::Live;
            state.locator = Some(locator.clone());
            state.kind = Some(kind);
        }

        tracing::info!(kind = ?kind, locator = %locator, "Stream is live");
        self.hub
            .broadcast(HubEvent::SessionStatusChanged(SessionStatus::Live))
            .await;

        match kind {
            SourceKind::File => self.defer_poll_start(epoch),
            SourceKind::Webcam | SourceKind::Rtsp => self.poller.start().await,
        }
        Ok(())
    }

    /// Enter Stopped and surface the start error, unless superseded
    async fn fail_start(&self, epoch: u64, err: Error) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if self.epoch.load(Ordering::SeqCst) != epoch {
                tracing::debug!(error = %err, "Discarding failure of a superseded stream start");
                return Ok(());
            }
            state.status = SessionStatus::Stopped;
            state.locator = None;
            state.kind = None;
        }

        tracing::error!(error = %err, "Stream start failed");
        self.poller.stop().await;
        self.hub
            .broadcast(HubEvent::SessionStatusChanged(SessionStatus::Stopped))
            .await;
        Err(err)
    }

    /// Install the delayed poll start for a freshly uploaded video
    fn defer_poll_start(&self, epoch: u64) {
        let poller = self.poller.clone();
        let epoch_counter = self.epoch.clone();
        let delay = self.video_poll_delay_ms;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if epoch_counter.load(Ordering::SeqCst) != epoch {
                return;
            }
            poller.start().await;
        });

        let old = match self.deferred_poll.lock() {
            Ok(mut guard) => guard.replace(handle),
            Err(poisoned) => poisoned.into_inner().replace(handle),
        };
        if let Some(old) = old {
            old.abort();
        }
    }

    fn cancel_deferred_poll(&self) {
        let handle = match self.deferred_poll.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        let handle = match self.deferred_poll.get_mut() {
            Ok(slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}
