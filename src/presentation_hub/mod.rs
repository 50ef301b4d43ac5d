//! PresentationHub - Event Distribution to the Rendering Layer
//!
//! ## Responsibilities
//!
//! - Subscriber registration for the presentation layer
//! - Broadcasting detection-board updates, novelty signals, and session
//!   status transitions
//!
//! The rendering layer itself (detection grid, toasts, stream element) is
//! outside this crate; it subscribes here and reacts to events.

use crate::alert_store::Detection;
use crate::stream_session::SessionStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Hub event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum HubEvent {
    /// The detection board was replaced; carries the full snapshot
    DetectionsChanged(Vec<Detection>),
    /// A detection newer than anything previously seen arrived
    NovelAlert,
    /// The stream session moved to a new status
    SessionStatusChanged(SessionStatus),
}

/// Registered subscriber
struct Subscriber {
    id: Uuid,
    tx: mpsc::UnboundedSender<HubEvent>,
}

/// PresentationHub instance
pub struct PresentationHub {
    subscribers: RwLock<HashMap<Uuid, Subscriber>>,
    subscriber_count: AtomicU64,
}

impl PresentationHub {
    /// Create new PresentationHub
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            subscriber_count: AtomicU64::new(0),
        }
    }

    /// Register a new subscriber
    pub async fn subscribe(&self) -> (Uuid, mpsc::UnboundedReceiver<HubEvent>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        {
            let mut subscribers = self.subscribers.write().await;
            subscribers.insert(id, Subscriber { id, tx });
        }

        self.subscriber_count.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(subscriber_id = %id, "Presentation subscriber registered");

        (id, rx)
    }

    /// Unregister a subscriber
    pub async fn unsubscribe(&self, id: &Uuid) {
        let mut subscribers = self.subscribers.write().await;
        if subscribers.remove(id).is_some() {
            self.subscriber_count.fetch_sub(1, Ordering::Relaxed);
            tracing::debug!(subscriber_id = %id, "Presentation subscriber removed");
        }
    }

    /// Broadcast an event to all subscribers
    pub async fn broadcast(&self, event: HubEvent) {
        let event_type = match &event {
            HubEvent::DetectionsChanged(_) => "detections_changed",
            HubEvent::NovelAlert => "novel_alert",
            HubEvent::SessionStatusChanged(_) => "session_status_changed",
        };
        tracing::debug!(event_type = %event_type, "Broadcasting event");

        let subscribers = self.subscribers.read().await;
        for sub in subscribers.values() {
            if let Err(e) = sub.tx.send(event.clone()) {
                tracing::warn!(subscriber_id = %sub.id, error = %e, "Failed to deliver event");
            }
        }
    }

    /// Get subscriber count
    pub fn subscriber_count(&self) -> u64 {
        self.subscriber_count.load(Ordering::Relaxed)
    }
}

impl Default for PresentationHub {
    fn default() -> Self {
        Self::new()
    }
}
