//! Application state
//!
//! Configuration plus the wired-up components for one session

use crate::capture_source::{
    CaptureDevice, CaptureSource, FfmpegCamera, StillFileCamera, DEFAULT_JPEG_QUALITY,
};
use crate::catalog::Catalog;
use crate::error::Result;
use crate::event_hub::EventHub;
use crate::orchestrator::Orchestrator;
use crate::service_gateway::{Gateway, ServiceGateway, DEFAULT_BASE_URL};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Backend base URL, including the `/api` prefix
    pub api_url: String,
    /// Per-request timeout for backend calls
    pub request_timeout: Duration,
    /// Video4Linux device; `None` disables the camera
    pub camera_device: Option<PathBuf>,
    /// Image file used instead of a camera when set
    pub still_image: Option<PathBuf>,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// ffmpeg frame grab timeout
    pub capture_timeout: Duration,
    /// JSON catalog override; built-in catalog when unset
    pub catalog_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: std::env::var("MOODFLIX_API_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            request_timeout: Duration::from_secs(
                std::env::var("MOODFLIX_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
            camera_device: match std::env::var("MOODFLIX_CAMERA_DEVICE") {
                Ok(v) if v.eq_ignore_ascii_case("none") || v.is_empty() => None,
                Ok(v) => Some(PathBuf::from(v)),
                Err(_) => Some(PathBuf::from("/dev/video0")),
            },
            still_image: std::env::var("MOODFLIX_STILL_IMAGE").ok().map(PathBuf::from),
            jpeg_quality: std::env::var("MOODFLIX_JPEG_QUALITY")
                .ok()
                .and_then(|v| v.parse::<u8>().ok())
                .filter(|q| (1..=100).contains(q))
                .unwrap_or(DEFAULT_JPEG_QUALITY),
            capture_timeout: Duration::from_secs(
                std::env::var("MOODFLIX_CAPTURE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
            ),
            catalog_path: std::env::var("MOODFLIX_CATALOG").ok().map(PathBuf::from),
        }
    }
}

impl AppConfig {
    /// Capture device selected by this config; the still image wins over the camera
    pub fn capture_device(&self) -> Option<Arc<dyn CaptureDevice>> {
        if let Some(path) = &self.still_image {
            return Some(Arc::new(StillFileCamera::new(path.clone())));
        }
        self.camera_device.as_ref().map(|device| {
            Arc::new(FfmpegCamera::new(device.clone(), self.capture_timeout))
                as Arc<dyn CaptureDevice>
        })
    }

    pub fn load_catalog(&self) -> Result<Catalog> {
        match &self.catalog_path {
            Some(path) => Catalog::load(path),
            None => Ok(Catalog::default()),
        }
    }
}

/// Wired components for one session
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub catalog: Arc<Catalog>,
    pub hub: Arc<EventHub>,
    pub gateway: Arc<dyn Gateway>,
    pub orchestrator: Orchestrator,
}

impl AppState {
    pub fn build(config: AppConfig) -> Result<Self> {
        let gateway: Arc<dyn Gateway> =
            Arc::new(ServiceGateway::with_timeout(config.api_url.clone(), config.request_timeout)?);
        Self::with_gateway(config, gateway)
    }

    /// Build around an existing gateway
    pub fn with_gateway(config: AppConfig, gateway: Arc<dyn Gateway>) -> Result<Self> {
        let catalog = Arc::new(config.load_catalog()?);
        let hub = Arc::new(EventHub::new());
        let capture = config
            .capture_device()
            .map(|device| CaptureSource::with_quality(device, config.jpeg_quality));

        tracing::info!(
            api_url = %config.api_url,
            capture = capture.is_some(),
            titles = catalog.len(),
            "Application state built"
        );

        let orchestrator =
            Orchestrator::new(gateway.clone(), capture, catalog.clone(), hub.clone());

        Ok(Self {
            config,
            catalog,
            hub,
            gateway,
            orchestrator,
        })
    }
}
