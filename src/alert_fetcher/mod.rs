//! AlertFetcher - Recent Alerts Round Trip
//!
//! ## Responsibilities
//!
//! - Fetch the backend's recent-alerts resource
//! - Validate the payload shape (must be a JSON array)
//! - Map raw wire items into [`Detection`] records
//!
//! The backend returns items newest first; that order is trusted and never
//! re-sorted client-side.

use crate::alert_store::Detection;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

/// One recent-alert item as the backend serves it. `timestamp` is epoch
/// seconds (float, file-mtime precision); unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct RawAlert {
    pub image: String,

    #[serde(default)]
    pub timestamp: Option<f64>,
}

/// Recent-alerts HTTP client
pub struct AlertFetcher {
    client: reqwest::Client,
    base_url: String,
    limit: usize,
}

impl AlertFetcher {
    /// Create new fetcher
    pub fn new(base_url: String, limit: usize) -> Self {
        Self::with_timeout(base_url, limit, Duration::from_secs(30))
    }

    /// Create new fetcher with custom timeout
    pub fn with_timeout(base_url: String, limit: usize, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            limit,
        }
    }

    /// Fetch the recent alerts, newest first.
    ///
    /// Non-2xx responses and non-array payloads are backend errors; callers
    /// on the polling path treat every error here as soft.
    pub async fn fetch(&self) -> Result<Vec<RawAlert>> {
        let url = format!("{}/api/alerts/recent?limit={}", self.base_url, self.limit);
        let resp = self.client.get(&url).send().await?;

        if !resp.status().is_success() {
            return Err(Error::Backend(format!(
                "recent alerts fetch failed: {}",
                resp.status()
            )));
        }

        let payload: serde_json::Value = resp.json().await?;
        parse_recent_payload(payload)
    }

    /// Get base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Decode a recent-alerts payload, rejecting anything that is not an array
fn parse_recent_payload(payload: serde_json::Value) -> Result<Vec<RawAlert>> {
    if !payload.is_array() {
        return Err(Error::Backend(
            "recent alerts payload is not an array".to_string(),
        ));
    }
    let items: Vec<RawAlert> = serde_json::from_value(payload)?;
    Ok(items)
}

/// Map raw wire items to detections, resolving timestamps once.
///
/// A missing timestamp defaults to the moment of mapping; a missing image
/// key falls back to a timestamp-derived identifier.
pub fn map_raw(raw: Vec<RawAlert>) -> Vec<Detection> {
    let now = Utc::now();
    raw.into_iter()
        .map(|item| {
            let timestamp = item
                .timestamp
                .and_then(|secs| DateTime::from_timestamp_millis((secs * 1000.0).round() as i64))
                .unwrap_or(now);
            let id = if item.image.is_empty() {
                format!("detection-{}", timestamp.timestamp_millis())
            } else {
                item.image.clone()
            };
            Detection {
                id,
                image_url: item.image,
                timestamp,
            }
        })
        .collect()
}
