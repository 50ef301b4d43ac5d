//! AlertStore - Recent Detection Buffer
//!
//! ## Responsibilities
//!
//! - Hold the bounded, newest-first list of recent weapon detections
//! - Track the high-water-mark timestamp used for novelty detection
//! - Provide read-only snapshots to the presentation layer
//!
//! The stored list is replaced wholesale on every successful fetch; it is
//! never merged or partially mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Maximum number of detections kept for rendering
pub const MAX_RECENT: usize = 10;

/// One recorded weapon-alert snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Stable identifier (backend image key, or timestamp-derived fallback)
    pub id: String,
    /// Opaque snapshot resource reference, not owned by this crate
    pub image_url: String,
    /// When the detection occurred
    pub timestamp: DateTime<Utc>,
}

/// Board state: detections newest first, plus the novelty watermark
struct AlertBoard {
    detections: Vec<Detection>,
    /// Newest timestamp ever observed. `None` until the first observation.
    latest_seen: Option<DateTime<Utc>>,
}

impl AlertBoard {
    fn new() -> Self {
        Self {
            detections: Vec::new(),
            latest_seen: None,
        }
    }
}

/// AlertStore instance
pub struct AlertStore {
    board: RwLock<AlertBoard>,
}

impl AlertStore {
    /// Create new AlertStore (empty, watermark unset)
    pub fn new() -> Self {
        Self {
            board: RwLock::new(AlertBoard::new()),
        }
    }

    /// Replace the stored detections with the given batch, newest first,
    /// truncated to [`MAX_RECENT`]. An empty batch yields an empty board.
    pub async fn ingest(&self, mut detections: Vec<Detection>) {
        detections.truncate(MAX_RECENT);
        let mut board = self.board.write().await;
        board.detections = detections;
        tracing::debug!(count = board.detections.len(), "Detection board replaced");
    }

    /// Whether the batch carries a detection newer than anything seen so far.
    ///
    /// The first observation after creation never counts as novel; it only
    /// establishes the baseline. Does not mutate state.
    pub async fn has_novel_alert(&self, detections: &[Detection]) -> bool {
        let newest = match detections.first() {
            Some(d) => d.timestamp,
            None => return false,
        };
        let board = self.board.read().await;
        match board.latest_seen {
            Some(seen) => newest > seen,
            None => false,
        }
    }

    /// Raise the watermark to the batch's newest timestamp. Never lowers it.
    /// On the first non-empty batch this establishes the baseline silently.
    pub async fn advance_watermark(&self, detections: &[Detection]) {
        let newest = match detections.first() {
            Some(d) => d.timestamp,
            None => return,
        };
        let mut board = self.board.write().await;
        match board.latest_seen {
            Some(seen) if seen >= newest => {}
            _ => board.latest_seen = Some(newest),
        }
    }

    /// Read-only copy of the current detections, newest first
    pub async fn snapshot(&self) -> Vec<Detection> {
        let board = self.board.read().await;
        board.detections.clone()
    }

    /// Number of detections currently held
    pub async fn count(&self) -> usize {
        let board = self.board.read().await;
        board.detections.len()
    }

    /// Current watermark, `None` before the first observation
    pub async fn latest_seen(&self) -> Option<DateTime<Utc>> {
        let board = self.board.read().await;
        board.latest_seen
    }
}

impl Default for AlertStore {
    fn default() -> Self {
        Self::new()
    }
}
