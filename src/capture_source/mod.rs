//! CaptureSource - Still Frame Capture
//!
//! ## Responsibilities
//!
//! - Acquire a live stream from a capture device
//! - Snapshot the current frame as a quality-80 JPEG at natural dimensions
//! - Scoped handle: the stream is stopped exactly once, at release or drop
//!
//! ## Design
//!
//! `CaptureHandle` is the only owner of the stream. `release` and `Drop`
//! share one stop path guarded by `Option::take`, so a handle can be released
//! explicitly, dropped, or both, and the device sees a single stop.

pub mod device;

pub use device::{CaptureDevice, FfmpegCamera, LiveStream, StillFileCamera};

use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::sync::Arc;
use uuid::Uuid;

/// Default JPEG quality (0.8 on a 0..1 scale)
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Encoded still image
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedStill {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
}

impl EncodedStill {
    pub fn new(bytes: Vec<u8>, width: u32, height: u32) -> Self {
        Self { bytes, width, height }
    }

    /// Build from a base64 payload, with or without a `data:...;base64,` prefix
    pub fn from_data_uri(payload: &str) -> Result<Self> {
        let encoded = match payload.split_once(',') {
            Some((prefix, rest)) if prefix.starts_with("data:") => rest,
            _ => payload,
        };
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::Validation(format!("invalid base64 still: {}", e)))?;
        let (width, height) = if bytes.is_empty() {
            (0, 0)
        } else {
            let img = image::load_from_memory(&bytes)?;
            (img.width(), img.height())
        };
        Ok(Self::new(bytes, width, height))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Bare base64, no data-URI prefix
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// Encode a frame as JPEG at its natural dimensions
pub fn encode_jpeg(frame: &DynamicImage, quality: u8) -> Result<EncodedStill> {
    let rgb = frame.to_rgb8();
    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
        return Err(Error::Validation("frame has no pixels".to_string()));
    }

    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));
    encoder.encode_image(&rgb)?;

    Ok(EncodedStill::new(bytes, width, height))
}

/// Exclusive owner of an opened stream
pub struct CaptureHandle {
    id: Uuid,
    device: String,
    stream: Option<Box<dyn LiveStream>>,
}

impl CaptureHandle {
    pub fn new(device: impl Into<String>, stream: Box<dyn LiveStream>) -> Self {
        Self {
            id: Uuid::new_v4(),
            device: device.into(),
            stream: Some(stream),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn is_live(&self) -> bool {
        self.stream.is_some()
    }

    /// Stop the stream; returns `false` if it was already stopped
    pub fn release(&mut self) -> bool {
        match self.stream.take() {
            Some(mut stream) => {
                stream.stop();
                tracing::debug!(
                    handle = %self.id,
                    device = %self.device,
                    "Capture device released"
                );
                true
            }
            None => false,
        }
    }

    async fn frame(&mut self) -> Result<DynamicImage> {
        match self.stream.as_mut() {
            Some(stream) => stream.frame().await,
            None => Err(Error::Device("capture handle already released".to_string())),
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for CaptureHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureHandle")
            .field("id", &self.id)
            .field("device", &self.device)
            .field("live", &self.is_live())
            .finish()
    }
}

/// Device plus encoding parameters
#[derive(Clone)]
pub struct CaptureSource {
    device: Arc<dyn CaptureDevice>,
    jpeg_quality: u8,
}

impl CaptureSource {
    pub fn new(device: Arc<dyn CaptureDevice>) -> Self {
        Self::with_quality(device, DEFAULT_JPEG_QUALITY)
    }

    pub fn with_quality(device: Arc<dyn CaptureDevice>, jpeg_quality: u8) -> Self {
        Self {
            device,
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    pub async fn acquire(&self) -> Result<CaptureHandle> {
        let name = self.device.describe();
        match self.device.open().await {
            Ok(stream) => {
                let handle = CaptureHandle::new(name, stream);
                tracing::info!(
                    handle = %handle.id(),
                    device = %handle.device(),
                    quality = self.jpeg_quality,
                    "Capture device acquired"
                );
                Ok(handle)
            }
            Err(e) => {
                tracing::warn!(device = %name, error = %e, "Capture device unavailable");
                Err(match e {
                    Error::Device(_) => e,
                    other => Error::Device(other.to_string()),
                })
            }
        }
    }

    /// Grab and encode the current frame. A lost device is `Error::Device`.
    pub async fn snapshot(&self, handle: &mut CaptureHandle) -> Result<EncodedStill> {
        let frame = handle.frame().await?;
        let still = encode_jpeg(&frame, self.jpeg_quality)?;

        tracing::debug!(
            handle = %handle.id(),
            width = still.width(),
            height = still.height(),
            size = still.bytes().len(),
            "Still captured"
        );

        Ok(still)
    }

    pub fn release(&self, mut handle: CaptureHandle) -> bool {
        handle.release()
    }
}

impl std::fmt::Debug for CaptureSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSource")
            .field("device", &self.device.describe())
            .field("jpeg_quality", &self.jpeg_quality)
            .finish()
    }
}
