//! Vigil Console - Stream & Alert Session Controller
//!
//! Console entry point: wires the controller components, mirrors hub
//! events into the log in place of a rendering layer, and drives one
//! viewing session from the STREAM_SOURCE environment variable.

use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vigil_console::presentation_hub::HubEvent;
use vigil_console::{ConsoleConfig, ConsoleState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vigil_console=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Vigil Console v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = ConsoleConfig::default();
    tracing::info!(
        backend_url = %config.backend_url,
        poll_interval_ms = config.poll_interval_ms,
        video_poll_delay_ms = config.video_poll_delay_ms,
        recent_alert_limit = config.recent_alert_limit,
        "Configuration loaded"
    );

    let state = ConsoleState::new(config);

    // Mirror hub events into the log
    let (subscriber_id, mut events) = state.hub.subscribe().await;
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                HubEvent::DetectionsChanged(detections) => {
                    tracing::info!(count = detections.len(), "Detection board updated");
                    for detection in &detections {
                        tracing::debug!(
                            id = %detection.id,
                            image = %detection.image_url,
                            timestamp = %detection.timestamp,
                            "Detection"
                        );
                    }
                }
                HubEvent::NovelAlert => {
                    tracing::warn!("WEAPON ALERT - new detection observed");
                }
                HubEvent::SessionStatusChanged(status) => {
                    tracing::info!(status = ?status, "Session status changed");
                }
            }
        }
    });

    // Show whatever the backend already recorded before any stream starts
    state.poller.poll_once().await;

    // Select the stream source: "webcam", an rtsp:// URL, or a video path
    match std::env::var("STREAM_SOURCE").ok().as_deref() {
        Some("webcam") => {
            if let Err(e) = state.session.select_webcam().await {
                tracing::error!(error = %e, "Webcam start failed");
            }
        }
        Some(source) if source.starts_with("rtsp://") => {
            if let Err(e) = state.session.select_rtsp(source).await {
                tracing::error!(error = %e, "RTSP start failed");
            }
        }
        Some(path) => {
            if let Err(e) = state.session.select_video(Path::new(path)).await {
                tracing::error!(error = %e, "Video upload failed");
            }
        }
        None => {
            tracing::info!("STREAM_SOURCE not set - idle after initial alert load");
        }
    }

    if let Some(locator) = state.session.stream_locator().await {
        tracing::info!(locator = %locator, "Annotated stream available");
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    state.session.stop().await;
    state.hub.unsubscribe(&subscriber_id).await;
    tracing::info!("Vigil Console stopped");

    Ok(())
}
