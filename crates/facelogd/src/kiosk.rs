//! Kiosk operations behind the D-Bus interface.

use crate::scanner::{ScanSnapshot, Scanner, ScannerError};
use crate::state::SharedState;
use crate::store::StoreError;
use base64::Engine as _;
use chrono::{DateTime, FixedOffset, Utc};
use facelog_core::export::{export_csv, export_filename, ExportError};
use facelog_core::registration::{RegistrationForm, ValidationError};
use facelog_core::report::{self, Dashboard};
use facelog_core::{AttendanceRecord, UserSummary};
use facelog_hw::{CameraError, FrameError};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KioskError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("camera: {0}")]
    Camera(#[from] CameraError),
    #[error("photo: {0}")]
    Photo(#[from] FrameError),
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("background task failed: {0}")]
    Task(String),
}

/// Where the registration photo comes from.
#[derive(Debug, Clone)]
pub enum PhotoSource {
    /// Capture one still from the camera.
    Camera,
    /// Load an image file and re-encode it as JPEG.
    File(PathBuf),
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub version: &'static str,
    pub users: usize,
    pub records: usize,
    pub scanner: ScanSnapshot,
}

pub struct Kiosk {
    state: SharedState,
    scanner: Scanner,
    jpeg_quality: u8,
    offset: FixedOffset,
}

impl Kiosk {
    pub fn new(state: SharedState, scanner: Scanner, jpeg_quality: u8, offset: FixedOffset) -> Self {
        Self {
            state,
            scanner,
            jpeg_quality,
            offset,
        }
    }

    fn local_now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }

    pub async fn start_scanner(&self) -> Result<ScanSnapshot, ScannerError> {
        self.scanner.start().await?;
        Ok(self.scanner.snapshot())
    }

    pub fn stop_scanner(&self) -> bool {
        self.scanner.stop().is_some()
    }

    pub fn shutdown(&self) {
        self.scanner.stop();
    }

    /// Validate the form, obtain the photo and append the new user.
    pub async fn register(
        &self,
        name: &str,
        role: &str,
        photo: PhotoSource,
    ) -> Result<UserSummary, KioskError> {
        let mut form = RegistrationForm::new(name, role);
        match form.validate() {
            Ok(()) | Err(ValidationError::MissingPhoto) => {}
            Err(e) => return Err(e.into()),
        }

        let jpeg = self.capture_photo(photo).await?;
        form.set_photo(base64::engine::general_purpose::STANDARD.encode(jpeg));
        let user = form.submit(Utc::now())?;
        let summary = UserSummary::from(&user);

        self.state.lock().await.register_user(user)?;
        Ok(summary)
    }

    async fn capture_photo(&self, photo: PhotoSource) -> Result<Vec<u8>, KioskError> {
        let quality = self.jpeg_quality;
        let provider = self.scanner.camera_provider();
        tokio::task::spawn_blocking(move || -> Result<Vec<u8>, KioskError> {
            match photo {
                PhotoSource::File(path) => Ok(facelog_hw::frame::image_file_to_jpeg(&path, quality)?),
                PhotoSource::Camera => {
                    // The stream is released when `source` drops at the end of this arm.
                    let mut source = provider.open()?;
                    let frame = source.capture_still()?;
                    Ok(frame.to_jpeg(quality)?)
                }
            }
        })
        .await
        .map_err(|e| KioskError::Task(e.to_string()))?
    }

    pub async fn status(&self) -> StatusReport {
        let state = self.state.lock().await;
        StatusReport {
            version: env!("CARGO_PKG_VERSION"),
            users: state.users().len(),
            records: state.records().len(),
            scanner: self.scanner.snapshot(),
        }
    }

    pub async fn users(&self) -> Vec<UserSummary> {
        self.state
            .lock()
            .await
            .users()
            .iter()
            .map(UserSummary::from)
            .collect()
    }

    /// Attendance history, newest first.
    pub async fn records(&self) -> Vec<AttendanceRecord> {
        let state = self.state.lock().await;
        report::history(state.records()).into_iter().cloned().collect()
    }

    pub async fn dashboard(&self) -> Dashboard {
        let state = self.state.lock().await;
        report::dashboard(state.users(), state.records(), self.local_now())
    }

    /// Returns `(filename, csv)`.
    pub async fn export(&self) -> Result<(String, String), KioskError> {
        let state = self.state.lock().await;
        let csv = export_csv(state.records(), self.offset)?;
        Ok((export_filename(self.local_now().date_naive()), csv))
    }
}
