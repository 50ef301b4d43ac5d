//! AlertPoller - Recurring Alert Fetch Loop
//!
//! ## Responsibilities
//!
//! - Own the repeating timer that drives alert fetches
//! - Apply each batch through the store in protocol order
//! - Guarantee at most one live timer, with cleanup on drop
//!
//! Fetch failures are soft: logged, the loop keeps running. Responses that
//! arrive after a stop or restart carry a stale generation and are dropped
//! instead of applied.

use crate::alert_fetcher::{map_raw, AlertFetcher};
use crate::alert_store::{AlertStore, Detection};
use crate::presentation_hub::{HubEvent, PresentationHub};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::interval;

/// Default spacing between alert fetch cycles (3 seconds)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3000;

/// AlertPoller instance
pub struct AlertPoller {
    fetcher: Arc<AlertFetcher>,
    store: Arc<AlertStore>,
    hub: Arc<PresentationHub>,
    interval_ms: u64,
    running: Arc<RwLock<bool>>,
    generation: Arc<AtomicU64>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AlertPoller {
    /// Create new AlertPoller
    pub fn new(
        fetcher: Arc<AlertFetcher>,
        store: Arc<AlertStore>,
        hub: Arc<PresentationHub>,
        interval_ms: u64,
    ) -> Self {
        Self {
            fetcher,
            store,
            hub,
            interval_ms,
            running: Arc::new(RwLock::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            task: Mutex::new(None),
        }
    }

    /// Start the polling loop.
    ///
    /// Idempotent: a live timer is cancelled before the new one is
    /// installed, so at most one timer exists at any instant. The first
    /// cycle runs immediately, then every `interval_ms`.
    pub async fn start(&self) {
        if *self.running.read().await {
            tracing::warn!("Alert polling already running - restarting");
        }
        self.stop().await;

        *self.running.write().await = true;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        tracing::info!(interval_ms = self.interval_ms, "Starting alert polling");

        let fetcher = self.fetcher.clone();
        let store = self.store.clone();
        let hub = self.hub.clone();
        let running = self.running.clone();
        let gen_counter = self.generation.clone();
        let interval_ms = self.interval_ms;

        let handle = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(interval_ms));

            loop {
                ticker.tick().await;

                {
                    let is_running = running.read().await;
                    if !*is_running {
                        break;
                    }
                }
                if gen_counter.load(Ordering::SeqCst) != generation {
                    break;
                }

                poll_tick(&fetcher, &store, &hub, &gen_counter, generation).await;
            }

            tracing::info!("Alert polling loop exited");
        });

        match self.task.lock() {
            Ok(mut guard) => *guard = Some(handle),
            Err(poisoned) => *poisoned.into_inner() = Some(handle),
        }
    }

    /// Stop the polling loop. Safe no-op when already stopped.
    pub async fn stop(&self) {
        let handle = match self.task.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        let was_running = {
            let mut running = self.running.write().await;
            let was = *running;
            *running = false;
            was
        };

        // Invalidate any response still in flight
        self.generation.fetch_add(1, Ordering::SeqCst);

        if let Some(handle) = handle {
            handle.abort();
        }
        if was_running {
            tracing::info!("Stopping alert polling");
        }
    }

    /// Run one fetch-and-apply cycle outside the timer (initial page load)
    pub async fn poll_once(&self) {
        let generation = self.generation.load(Ordering::SeqCst);
        poll_tick(&self.fetcher, &self.store, &self.hub, &self.generation, generation).await;
    }

    /// Whether a timer is currently installed
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}

impl Drop for AlertPoller {
    fn drop(&mut self) {
        let handle = match self.task.get_mut() {
            Ok(slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

/// One polling cycle: fetch, then apply unless the loop moved on meanwhile
async fn poll_tick(
    fetcher: &AlertFetcher,
    store: &AlertStore,
    hub: &PresentationHub,
    gen_counter: &AtomicU64,
    tick_generation: u64,
) {
    let raw = match fetcher.fetch().await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(error = %e, "Alert fetch failed - keeping previous board");
            return;
        }
    };

    if gen_counter.load(Ordering::SeqCst) != tick_generation {
        tracing::debug!("Discarding alert response fetched under a cancelled cycle");
        return;
    }

    apply_observations(store, hub, map_raw(raw)).await;
}

/// Apply one batch through the store. Novelty is evaluated against the
/// watermark before the watermark itself advances; that order is what makes
/// repeat batches silent.
async fn apply_observations(store: &AlertStore, hub: &PresentationHub, detections: Vec<Detection>) {
    if store.has_novel_alert(&detections).await {
        tracing::info!("New weapon alert detected");
        hub.broadcast(HubEvent::NovelAlert).await;
    }
    store.advance_watermark(&detections).await;
    store.ingest(detections).await;
    hub.broadcast(HubEvent::DetectionsChanged(store.snapshot().await)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Minimal canned-response backend. Serves `bodies[n]` to request n
    /// (the last body repeats), optionally delaying each response.
    async fn spawn_backend(
        bodies: Vec<String>,
        delay: Duration,
        hits: Arc<AtomicUsize>,
    ) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((mut sock, _)) = listener.accept().await else {
                    break;
                };
                let n = hits.fetch_add(1, Ordering::SeqCst);
                let body = bodies[n.min(bodies.len() - 1)].clone();

                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = sock.read(&mut buf).await;
                    tokio::time::sleep(delay).await;
                    let resp = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = sock.write_all(resp.as_bytes()).await;
                    let _ = sock.shutdown().await;
                });
            }
        });

        format!("http://{}", addr)
    }

    fn poller_for(base_url: String, interval_ms: u64) -> (Arc<AlertPoller>, Arc<AlertStore>, Arc<PresentationHub>) {
        let store = Arc::new(AlertStore::new());
        let hub = Arc::new(PresentationHub::new());
        let fetcher = Arc::new(AlertFetcher::new(base_url, 10));
        let poller = Arc::new(AlertPoller::new(fetcher, store.clone(), hub.clone(), interval_ms));
        (poller, store, hub)
    }

    fn det(image: &str, secs: i64) -> Detection {
        Detection {
            id: image.to_string(),
            image_url: image.to_string(),
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_poll_once_applies_batch_without_novelty() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = spawn_backend(
            vec![r#"[{"image":"a.jpg","timestamp":100.0}]"#.to_string()],
            Duration::ZERO,
            hits,
        )
        .await;
        let (poller, store, hub) = poller_for(base, 3000);
        let (_id, mut rx) = hub.subscribe().await;

        poller.poll_once().await;

        assert_eq!(store.count().await, 1);
        // First observation: board update only, no novelty signal
        assert!(matches!(rx.try_recv(), Ok(HubEvent::DetectionsChanged(_))));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_novelty_signal_precedes_board_update() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = spawn_backend(
            vec![
                r#"[{"image":"a.jpg","timestamp":100.0}]"#.to_string(),
                r#"[{"image":"b.jpg","timestamp":200.0}]"#.to_string(),
            ],
            Duration::ZERO,
            hits,
        )
        .await;
        let (poller, _store, hub) = poller_for(base, 3000);
        let (_id, mut rx) = hub.subscribe().await;

        poller.poll_once().await;
        poller.poll_once().await;

        assert!(matches!(rx.try_recv(), Ok(HubEvent::DetectionsChanged(_))));
        assert!(matches!(rx.try_recv(), Ok(HubEvent::NovelAlert)));
        assert!(matches!(rx.try_recv(), Ok(HubEvent::DetectionsChanged(_))));
    }

    #[tokio::test]
    async fn test_double_start_keeps_single_timer() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = spawn_backend(vec!["[]".to_string()], Duration::ZERO, hits.clone()).await;
        let (poller, _store, _hub) = poller_for(base, 100);

        poller.start().await;
        poller.start().await;
        assert!(poller.is_running().await);

        tokio::time::sleep(Duration::from_millis(250)).await;
        poller.stop().await;

        // A single timer fits at most the immediate cycle plus two interval
        // ticks in this window (plus one cycle from the replaced timer);
        // two live timers would roughly double that.
        let seen = hits.load(Ordering::SeqCst);
        assert!((1..=4).contains(&seen), "unexpected request count {seen}");
        assert!(!poller.is_running().await);
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_loop_and_store() {
        // Unroutable port: every fetch fails fast
        let (poller, store, _hub) = poller_for("http://127.0.0.1:9".to_string(), 50);
        store.ingest(vec![det("a.jpg", 100)]).await;
        store.advance_watermark(&[det("a.jpg", 100)]).await;

        poller.start().await;
        tokio::time::sleep(Duration::from_millis(160)).await;

        assert!(poller.is_running().await);
        assert_eq!(store.count().await, 1);
        assert_eq!(
            store.latest_seen().await,
            Some(Utc.timestamp_opt(100, 0).unwrap())
        );
        poller.stop().await;
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let (poller, _store, _hub) = poller_for("http://127.0.0.1:9".to_string(), 50);
        poller.stop().await;
        assert!(!poller.is_running().await);
    }

    #[tokio::test]
    async fn test_stop_discards_in_flight_response() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = spawn_backend(
            vec![r#"[{"image":"a.jpg","timestamp":100.0}]"#.to_string()],
            Duration::from_millis(150),
            hits,
        )
        .await;
        let (poller, store, _hub) = poller_for(base, 3000);

        let in_flight = {
            let poller = poller.clone();
            tokio::spawn(async move { poller.poll_once().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        poller.stop().await;
        in_flight.await.unwrap();

        // Response arrived under a bumped generation: not applied
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn test_apply_observations_full_sequence() {
        let store = AlertStore::new();
        let hub = PresentationHub::new();
        let (_id, mut rx) = hub.subscribe().await;

        apply_observations(&store, &hub, vec![det("a.jpg", 100)]).await;
        apply_observations(&store, &hub, vec![det("b.jpg", 200)]).await;
        apply_observations(&store, &hub, vec![det("b.jpg", 200)]).await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        let novel_count = events
            .iter()
            .filter(|e| matches!(e, HubEvent::NovelAlert))
            .count();
        assert_eq!(novel_count, 1);
        assert_eq!(events.len(), 4);

        assert_eq!(store.latest_seen().await, Some(Utc.timestamp_opt(200, 0).unwrap()));
        let ids: Vec<String> = store.snapshot().await.into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["b.jpg"]);
    }

    #[tokio::test]
    async fn test_empty_batch_emits_board_update_only() {
        let store = AlertStore::new();
        let hub = PresentationHub::new();
        let (_id, mut rx) = hub.subscribe().await;

        apply_observations(&store, &hub, Vec::new()).await;

        match rx.try_recv() {
            Ok(HubEvent::DetectionsChanged(snapshot)) => assert!(snapshot.is_empty()),
            other => panic!("expected board update, got {other:?}"),
        }
        assert!(rx.try_recv().is_err());
        assert_eq!(store.latest_seen().await, None);
    }
}
