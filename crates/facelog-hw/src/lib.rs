//! facelog-hw: camera capture for the attendance kiosk.
//!
//! Provides V4L2-based still capture, dark-frame rejection and JPEG
//! encoding, behind the [`FrameSource`] and [`CameraProvider`] seams the
//! daemon drives.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, PixelFormat, V4lProvider};
pub use frame::{Frame, FrameError, PixelLayout};

/// A live camera stream that can hand out still frames.
///
/// Dropping the source releases the device.
pub trait FrameSource: Send {
    /// Capture one usable still, or fail with a transient error.
    fn capture_still(&mut self) -> Result<Frame, CameraError>;
}

/// Acquires a camera stream for one session.
pub trait CameraProvider: Send + Sync {
    fn open(&self) -> Result<Box<dyn FrameSource>, CameraError>;
}
