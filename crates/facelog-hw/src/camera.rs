//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, Frame, PixelLayout};
use crate::{CameraProvider, FrameSource};
use std::io;
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Share of near-black pixels above which a frame counts as dark.
const DARK_THRESHOLD: f32 = 0.95;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("frame too dark")]
    DarkFrame,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel), converted to RGB.
    Yuyv,
    /// 8-bit grayscale (1 byte/pixel).
    Grey,
}

/// V4L2 camera device handle.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 camera device by path (e.g., "/dev/video0") and request
    /// the given resolution.
    pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| match e.kind() {
            io::ErrorKind::PermissionDenied => {
                CameraError::PermissionDenied(format!("{device_path}: {e}"))
            }
            _ if e.to_string().contains("busy") || e.raw_os_error() == Some(16) => {
                CameraError::DeviceBusy
            }
            _ => CameraError::DeviceNotFound(format!("{device_path}: {e}")),
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        // Ask for YUYV; some drivers only offer GREY, which is accepted as-is.
        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;

        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = width;
        fmt.height = height;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let fourcc = negotiated.fourcc;
        let pixel_format = if fourcc == FourCC::new(b"YUYV") {
            PixelFormat::Yuyv
        } else if fourcc == FourCC::new(b"GREY") {
            PixelFormat::Grey
        } else {
            return Err(CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV or GREY)"
            )));
        };

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "negotiated format"
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            fourcc,
            pixel_format,
        })
    }

    /// Capture a single frame. Dark frames are returned with `is_dark` set.
    pub fn capture_frame(&self) -> Result<Frame, CameraError> {
        let mut stream =
            MmapStream::with_buffers(&self.device, BufType::VideoCapture, 4).map_err(|e| {
                CameraError::CaptureFailed(format!("failed to create mmap stream: {e}"))
            })?;

        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        let (data, layout, is_dark) = self.convert(buf)?;

        Ok(Frame {
            data,
            width: self.width,
            height: self.height,
            layout,
            timestamp: std::time::Instant::now(),
            sequence: meta.sequence,
            is_dark,
        })
    }

    /// Convert a raw buffer to the frame layout and check it for darkness.
    fn convert(&self, buf: &[u8]) -> Result<(Vec<u8>, PixelLayout, bool), CameraError> {
        let pixels = (self.width * self.height) as usize;

        match self.pixel_format {
            PixelFormat::Grey => {
                if buf.len() < pixels {
                    return Err(CameraError::CaptureFailed(format!(
                        "GREY buffer too short: expected {pixels}, got {}",
                        buf.len()
                    )));
                }
                let gray = buf[..pixels].to_vec();
                let dark = frame::is_dark_frame(&gray, DARK_THRESHOLD);
                Ok((gray, PixelLayout::Luma8, dark))
            }
            PixelFormat::Yuyv => {
                let luma = frame::yuyv_to_grayscale(buf, self.width, self.height)
                    .map_err(|e| CameraError::CaptureFailed(format!("YUYV conversion failed: {e}")))?;
                let dark = frame::is_dark_frame(&luma, DARK_THRESHOLD);
                let rgb = frame::yuyv_to_rgb(buf, self.width, self.height)
                    .map_err(|e| CameraError::CaptureFailed(format!("YUYV conversion failed: {e}")))?;
                Ok((rgb, PixelLayout::Rgb8, dark))
            }
        }
    }

    /// Capture and discard frames so auto exposure can settle.
    pub fn discard_warmup(&self, count: usize) {
        if count == 0 {
            return;
        }
        tracing::info!(count, "discarding warmup frames");
        for _ in 0..count {
            let _ = self.capture_frame();
        }
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

impl FrameSource for Camera {
    fn capture_still(&mut self) -> Result<Frame, CameraError> {
        let frame = self.capture_frame()?;
        if frame.is_dark {
            tracing::debug!(seq = frame.sequence, "dark frame");
            return Err(CameraError::DarkFrame);
        }
        Ok(frame)
    }
}

/// Opens a V4L2 device for each camera session.
#[derive(Debug, Clone)]
pub struct V4lProvider {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub warmup_frames: usize,
}

impl V4lProvider {
    pub fn new(device: impl Into<String>, warmup_frames: usize) -> Self {
        Self {
            device: device.into(),
            width: 1280,
            height: 720,
            warmup_frames,
        }
    }
}

impl CameraProvider for V4lProvider {
    fn open(&self) -> Result<Box<dyn FrameSource>, CameraError> {
        let camera = Camera::open(&self.device, self.width, self.height)?;
        camera.discard_warmup(self.warmup_frames);
        Ok(Box::new(camera))
    }
}
