//! V4L2 camera capture via the `v4l` crate.

use crate::frame;
use image::RgbImage;
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::mmap::Stream as MmapStream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};
use veriface_core::backend::{FrameError, FrameSource};

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelFormat {
    /// 24-bit RGB (passed through as-is).
    Rgb3,
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// 8-bit grayscale (1 byte/pixel).
    Grey,
}

/// V4L2 camera handle. The device is acquired once at `open` and released
/// exactly once when the camera is dropped, on every exit path.
pub struct Camera {
    stream: MmapStream<'static>,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 camera device by path (e.g., "/dev/video0").
    pub fn open(device_path: &str) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device
            .query_caps()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to query capabilities: {e}")))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        // Prefer RGB3 so no conversion is needed, fall back to YUYV, then
        // accept GREY (IR cameras).
        let mut fmt = device
            .format()
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("failed to get format: {e}")))?;
        let desired = Format::new(fmt.width, fmt.height, FourCC::new(b"RGB3"));
        fmt = device.set_format(&desired).unwrap_or(fmt);
        if fmt.fourcc != FourCC::new(b"RGB3") {
            let yuyv = Format::new(fmt.width, fmt.height, FourCC::new(b"YUYV"));
            fmt = device.set_format(&yuyv).unwrap_or(fmt);
        }

        let pixel_format = match fmt.fourcc {
            f if f == FourCC::new(b"RGB3") => PixelFormat::Rgb3,
            f if f == FourCC::new(b"YUYV") => PixelFormat::Yuyv,
            f if f == FourCC::new(b"GREY") => PixelFormat::Grey,
            other => {
                return Err(CameraError::FormatNegotiationFailed(format!(
                    "unsupported pixel format: {other:?} (need RGB3, YUYV, or GREY)"
                )))
            }
        };

        tracing::info!(
            width = fmt.width,
            height = fmt.height,
            fourcc = ?fmt.fourcc,
            "negotiated format"
        );

        let stream = MmapStream::with_buffers(&device, BufType::VideoCapture, 4)
            .map_err(|e| CameraError::CaptureFailed(format!("failed to create mmap stream: {e}")))?;

        Ok(Self {
            stream,
            width: fmt.width,
            height: fmt.height,
            device_path: device_path.to_string(),
            pixel_format,
        })
    }

    /// Blocking read of the next frame, converted to RGB.
    pub fn capture(&mut self) -> Result<RgbImage, CameraError> {
        let (buf, meta) = self
            .stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;
        tracing::trace!(seq = meta.sequence, len = buf.len(), "dequeued frame buffer");

        let rgb = match self.pixel_format {
            PixelFormat::Rgb3 => {
                let expected = (self.width * self.height * 3) as usize;
                if buf.len() < expected {
                    return Err(CameraError::CaptureFailed(format!(
                        "RGB3 buffer too short: expected {expected}, got {}",
                        buf.len()
                    )));
                }
                buf[..expected].to_vec()
            }
            PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, self.width, self.height)
                .map_err(|e| CameraError::CaptureFailed(e.to_string()))?,
            PixelFormat::Grey => frame::grey_to_rgb(buf, self.width, self.height)
                .map_err(|e| CameraError::CaptureFailed(e.to_string()))?,
        };

        RgbImage::from_raw(self.width, self.height, rgb)
            .ok_or_else(|| CameraError::CaptureFailed("failed to build image buffer".into()))
    }

    /// Discard `count` frames so auto-gain and auto-exposure settle before
    /// the loop starts. Read errors here are ignored.
    pub fn warmup(&mut self, count: usize) {
        if count > 0 {
            tracing::info!(count, "discarding warmup frames");
            for _ in 0..count {
                let _ = self.capture();
            }
        }
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        tracing::debug!(device = %self.device_path, "camera released");
    }
}

impl FrameSource for Camera {
    fn next_frame(&mut self) -> Result<RgbImage, FrameError> {
        self.capture().map_err(|e| FrameError::Capture(e.to_string()))
    }
}
