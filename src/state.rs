//! Application state
//!
//! Holds the shared components for one console session

use crate::alert_fetcher::AlertFetcher;
use crate::alert_poller::{AlertPoller, DEFAULT_POLL_INTERVAL_MS};
use crate::alert_store::{AlertStore, MAX_RECENT};
use crate::presentation_hub::PresentationHub;
use crate::stream_gateway::StreamGateway;
use crate::stream_session::{StreamSession, DEFAULT_VIDEO_POLL_DELAY_MS};
use std::sync::Arc;
use std::time::Duration;

/// Console configuration
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    /// Detection backend base URL
    pub backend_url: String,
    /// Spacing between alert fetch cycles
    pub poll_interval_ms: u64,
    /// Delay before polling starts after a video upload goes live
    pub video_poll_delay_ms: u64,
    /// How many recent alerts to request per fetch
    pub recent_alert_limit: usize,
    /// HTTP request timeout
    pub http_timeout_secs: u64,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            backend_url: std::env::var("BACKEND_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8000".to_string()),
            poll_interval_ms: std::env::var("ALERT_POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            video_poll_delay_ms: std::env::var("VIDEO_POLL_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_VIDEO_POLL_DELAY_MS),
            recent_alert_limit: std::env::var("RECENT_ALERT_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(MAX_RECENT),
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        }
    }
}

/// Console state shared across tasks
#[derive(Clone)]
pub struct ConsoleState {
    /// Console config
    pub config: ConsoleConfig,
    /// AlertStore (detection board and watermark)
    pub store: Arc<AlertStore>,
    /// PresentationHub (renderer-facing events)
    pub hub: Arc<PresentationHub>,
    /// AlertPoller (recurring fetch loop)
    pub poller: Arc<AlertPoller>,
    /// StreamGateway (backend HTTP adapter)
    pub gateway: Arc<StreamGateway>,
    /// StreamSession (viewing session state machine)
    pub session: Arc<StreamSession>,
}

impl ConsoleState {
    /// Wire up the component graph for one console session
    pub fn new(config: ConsoleConfig) -> Self {
        let timeout = Duration::from_secs(config.http_timeout_secs);
        let store = Arc::new(AlertStore::new());
        let hub = Arc::new(PresentationHub::new());
        let fetcher = Arc::new(AlertFetcher::with_timeout(
            config.backend_url.clone(),
            config.recent_alert_limit,
            timeout,
        ));
        let poller = Arc::new(AlertPoller::new(
            fetcher,
            store.clone(),
            hub.clone(),
            config.poll_interval_ms,
        ));
        let gateway = Arc::new(StreamGateway::with_timeout(
            config.backend_url.clone(),
            timeout,
        ));
        let session = Arc::new(StreamSession::new(
            gateway.clone(),
            poller.clone(),
            hub.clone(),
            config.video_poll_delay_ms,
        ));

        Self {
            config,
            store,
            hub,
            poller,
            gateway,
            session,
        }
    }
}
