//! StreamGateway - Detection Backend Integration
//!
//! ## Responsibilities
//!
//! - Start/stop calls against the detection backend
//! - Video upload (multipart)
//! - Stream locator construction
//! - RTSP URL validation

use crate::error::{Error, Result};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Response of the video start call. The backend names the locator field
/// `stream_url`; both spellings are accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct VideoStartResponse {
    #[serde(default, alias = "stream_url")]
    pub stream: Option<String>,

    #[serde(default)]
    pub file: Option<String>,

    #[serde(default)]
    pub original_filename: Option<String>,
}

/// StreamGateway instance
pub struct StreamGateway {
    client: reqwest::Client,
    base_url: String,
}

impl StreamGateway {
    /// Create new StreamGateway
    pub fn new(base_url: String) -> Self {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    /// Create new StreamGateway with custom timeout
    pub fn with_timeout(base_url: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Upload a video file for detection processing
    pub async fn start_video(&self, path: &Path) -> Result<VideoStartResponse> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.mp4".to_string());
        let mime = video_mime(&file_name);

        let form = Form::new().part(
            "file",
            Part::bytes(bytes).file_name(file_name.clone()).mime_str(mime)?,
        );

        let url = format!("{}/detect/video", self.base_url);
        let resp = self.client.post(&url).multipart(form).send().await?;

        if !resp.status().is_success() {
            return Err(Error::Backend(format!(
                "video upload failed: {}",
                resp.status()
            )));
        }

        let result: VideoStartResponse = resp.json().await?;
        tracing::debug!(file = %file_name, "Video accepted by backend");
        Ok(result)
    }

    /// Start webcam capture server-side
    pub async fn start_webcam(&self) -> Result<()> {
        let url = format!("{}/detect/webcam", self.base_url);
        let resp = self.client.post(&url).send().await?;

        if !resp.status().is_success() {
            return Err(Error::Backend(format!(
                "webcam start failed: {}",
                resp.status()
            )));
        }

        Ok(())
    }

    /// Stop the current capture. Callers treat failures as best-effort.
    pub async fn stop_capture(&self) -> Result<()> {
        let url = format!("{}/stream/stop", self.base_url);
        let resp = self.client.post(&url).send().await?;

        if !resp.status().is_success() {
            return Err(Error::Backend(format!(
                "capture stop failed: {}",
                resp.status()
            )));
        }

        Ok(())
    }

    /// Resolve the locator for an uploaded video from the start response:
    /// the backend's stream field wins, else it is synthesized from the
    /// server-assigned file name.
    pub fn resolve_video_locator(&self, resp: &VideoStartResponse) -> Result<String> {
        if let Some(ref stream) = resp.stream {
            if stream.starts_with("http") {
                return Ok(stream.clone());
            }
            return Ok(format!("{}{}", self.base_url, stream));
        }
        match resp.file {
            Some(ref file) => Ok(self.video_stream_locator(file)),
            None => Err(Error::Backend(
                "video response carries no stream locator".to_string(),
            )),
        }
    }

    /// Locator for a processed video stream
    pub fn video_stream_locator(&self, file: &str) -> String {
        format!(
            "{}/stream/video?file={}",
            self.base_url,
            urlencoding::encode(file)
        )
    }

    /// Locator for the live webcam stream
    pub fn webcam_stream_locator(&self) -> String {
        format!("{}/stream", self.base_url)
    }

    /// Locator for an RTSP camera stream. The camera URL rides along as a
    /// query parameter; requesting the locator is what starts the stream.
    pub fn rtsp_stream_locator(&self, rtsp_url: &str) -> String {
        format!(
            "{}/stream/rtsp?url={}",
            self.base_url,
            urlencoding::encode(rtsp_url)
        )
    }

    /// Get base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Check an operator-supplied RTSP URL before any network traffic
pub fn validate_rtsp_url(url: &str) -> Result<()> {
    if url.trim().is_empty() {
        return Err(Error::Validation("RTSP URL is required".to_string()));
    }
    if !url.starts_with("rtsp://") {
        return Err(Error::Validation(
            "RTSP URL must start with rtsp://".to_string(),
        ));
    }
    Ok(())
}

/// Content type for the upload, from the file extension
fn video_mime(file_name: &str) -> &'static str {
    match file_name.rsplit('.').next().map(str::to_ascii_lowercase).as_deref() {
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        Some("avi") => "video/x-msvideo",
        Some("mkv") => "video/x-matroska",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn gateway() -> StreamGateway {
        StreamGateway::new("http://backend:8000".to_string())
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let gw = StreamGateway::new("http://backend:8000/".to_string());
        assert_eq!(gw.base_url(), "http://backend:8000");
    }

    #[test]
    fn test_validate_rtsp_url() {
        assert!(validate_rtsp_url("rtsp://cam.local/live").is_ok());
        assert!(matches!(
            validate_rtsp_url(""),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            validate_rtsp_url("http://cam.local/live"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_rtsp_locator_encodes_url() {
        let locator = gateway().rtsp_stream_locator("rtsp://cam.local/live?ch=1");
        assert_eq!(
            locator,
            "http://backend:8000/stream/rtsp?url=rtsp%3A%2F%2Fcam.local%2Flive%3Fch%3D1"
        );
    }

    #[test]
    fn test_webcam_locator() {
        assert_eq!(gateway().webcam_stream_locator(), "http://backend:8000/stream");
    }

    #[test]
    fn test_video_locator_prefers_stream_field() {
        let resp = VideoStartResponse {
            stream: Some("/stream/video?file=abc.mp4".to_string()),
            file: Some("ignored.mp4".to_string()),
            original_filename: None,
        };
        let locator = gateway().resolve_video_locator(&resp).unwrap();
        assert_eq!(locator, "http://backend:8000/stream/video?file=abc.mp4");
    }

    #[test]
    fn test_video_locator_falls_back_to_file() {
        let resp = VideoStartResponse {
            stream: None,
            file: Some("abc.mp4".to_string()),
            original_filename: None,
        };
        let locator = gateway().resolve_video_locator(&resp).unwrap();
        assert_eq!(locator, "http://backend:8000/stream/video?file=abc.mp4");
    }

    #[test]
    fn test_video_locator_missing_both_is_error() {
        let resp = VideoStartResponse {
            stream: None,
            file: None,
            original_filename: None,
        };
        assert!(matches!(
            gateway().resolve_video_locator(&resp),
            Err(Error::Backend(_))
        ));
    }

    #[test]
    fn test_video_response_accepts_stream_url_alias() {
        let resp: VideoStartResponse = serde_json::from_value(serde_json::json!({
            "file": "abc.mp4",
            "original_filename": "holdup.mp4",
            "stream_url": "/stream/video?file=abc.mp4"
        }))
        .unwrap();
        assert_eq!(resp.stream.as_deref(), Some("/stream/video?file=abc.mp4"));
        assert_eq!(resp.original_filename.as_deref(), Some("holdup.mp4"));
    }

    #[test]
    fn test_video_mime_from_extension() {
        assert_eq!(video_mime("clip.MP4"), "video/mp4");
        assert_eq!(video_mime("clip.mkv"), "video/x-matroska");
        assert_eq!(video_mime("clip"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_start_video_missing_file_is_io_error() {
        let gw = StreamGateway::new("http://127.0.0.1:9".to_string());
        let err = gw
            .start_video(Path::new("/nonexistent/clip.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn test_start_video_unreachable_backend_is_http_error() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"not a real video").unwrap();

        let gw = StreamGateway::new("http://127.0.0.1:9".to_string());
        let err = gw.start_video(tmp.path()).await.unwrap_err();
        assert!(matches!(err, Error::Http(_)));
    }
}
