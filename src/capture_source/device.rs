//! Capture device backends
//!
//! - `FfmpegCamera`: Video4Linux device, one ffmpeg grab per frame
//! - `StillFileCamera`: re-reads an image file per frame

use crate::error::{Error, Result};
use async_trait::async_trait;
use image::DynamicImage;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// A source that can be opened into a live stream
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Human-readable device identifier for logs
    fn describe(&self) -> String;

    /// Open a live stream; denial or absence is `Error::Device`
    async fn open(&self) -> Result<Box<dyn LiveStream>>;
}

/// An opened stream. `stop` ends every underlying track.
#[async_trait]
pub trait LiveStream: Send {
    /// Current frame at its natural dimensions
    async fn frame(&mut self) -> Result<DynamicImage>;

    fn stop(&mut self);
}

/// Video4Linux camera driven through ffmpeg
#[derive(Debug, Clone)]
pub struct FfmpegCamera {
    device: PathBuf,
    timeout: Duration,
}

impl FfmpegCamera {
    pub fn new(device: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            device: device.into(),
            timeout,
        }
    }
}

#[async_trait]
impl CaptureDevice for FfmpegCamera {
    fn describe(&self) -> String {
        format!("v4l2:{}", self.device.display())
    }

    async fn open(&self) -> Result<Box<dyn LiveStream>> {
        if tokio::fs::metadata(&self.device).await.is_err() {
            return Err(Error::Device(format!(
                "camera {} not found",
                self.device.display()
            )));
        }

        let mut stream = FfmpegStream {
            device: self.device.clone(),
            timeout: self.timeout,
            stopped: false,
        };

        // Permission problems only show once ffmpeg touches the device
        stream.frame().await?;

        Ok(Box::new(stream))
    }
}

struct FfmpegStream {
    device: PathBuf,
    timeout: Duration,
    stopped: bool,
}

#[async_trait]
impl LiveStream for FfmpegStream {
    async fn frame(&mut self) -> Result<DynamicImage> {
        if self.stopped {
            return Err(Error::Device("stream stopped".to_string()));
        }

        let device = self.device.to_string_lossy().to_string();
        let child = Command::new("ffmpeg")
            .args([
                "-f", "v4l2",
                "-i", &device,
                "-frames:v", "1",
                "-f", "image2pipe",
                "-vcodec", "png",
                "-loglevel", "error",
                "-",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Device(format!("ffmpeg spawn failed: {}", e)))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(Error::Device(format!("ffmpeg execution failed: {}", e))),
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    device = %device,
                    "ffmpeg timeout, process killed via kill_on_drop"
                );
                return Err(Error::Device(format!(
                    "ffmpeg timeout ({}ms)",
                    self.timeout.as_millis()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Device(format!("ffmpeg failed: {}", stderr.trim())));
        }
        if output.stdout.is_empty() {
            return Err(Error::Device("ffmpeg returned empty output".to_string()));
        }

        image::load_from_memory_with_format(&output.stdout, image::ImageFormat::Png)
            .map_err(|e| Error::Device(format!("undecodable frame: {}", e)))
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

/// Camera backed by an image file on disk
#[derive(Debug, Clone)]
pub struct StillFileCamera {
    path: PathBuf,
}

impl StillFileCamera {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CaptureDevice for StillFileCamera {
    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }

    async fn open(&self) -> Result<Box<dyn LiveStream>> {
        let mut stream = StillFileStream {
            path: self.path.clone(),
            stopped: false,
        };
        stream.frame().await?;
        Ok(Box::new(stream))
    }
}

struct StillFileStream {
    path: PathBuf,
    stopped: bool,
}

#[async_trait]
impl LiveStream for StillFileStream {
    async fn frame(&mut self) -> Result<DynamicImage> {
        if self.stopped {
            return Err(Error::Device("stream stopped".to_string()));
        }

        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            Error::Device(format!("cannot read {}: {}", self.path.display(), e))
        })?;

        image::load_from_memory(&bytes)
            .map_err(|e| Error::Device(format!("undecodable image {}: {}", self.path.display(), e)))
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_png(name: &str) -> PathBuf {
        let path =
            std::env::temp_dir().join(format!("moodflix-{}-{}.png", name, std::process::id()));
        DynamicImage::new_rgb8(6, 4).save(&path).unwrap();
        path
    }

    #[tokio::test]
    async fn test_still_file_camera_reads_frame() {
        let path = temp_png("still");
        let camera = StillFileCamera::new(&path);
        let mut stream = camera.open().await.unwrap();
        let frame = stream.frame().await.unwrap();
        assert_eq!((frame.width(), frame.height()), (6, 4));

        stream.stop();
        assert!(matches!(stream.frame().await, Err(Error::Device(_))));
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_missing_file_is_device_error() {
        let camera = StillFileCamera::new("/nonexistent/moodflix/face.png");
        assert!(matches!(camera.open().await, Err(Error::Device(_))));
    }

    #[tokio::test]
    async fn test_missing_v4l2_device_is_device_error() {
        let camera = FfmpegCamera::new("/dev/moodflix-no-such-video", Duration::from_secs(1));
        assert!(matches!(camera.open().await, Err(Error::Device(_))));
        assert_eq!(camera.describe(), "v4l2:/dev/moodflix-no-such-video");
    }
}
