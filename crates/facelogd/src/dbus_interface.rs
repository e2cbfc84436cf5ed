use crate::kiosk::{Kiosk, KioskError, PhotoSource};
use crate::scanner::ScannerError;
use facelog_hw::CameraError;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use zbus::{fdo, interface};

pub const BUS_NAME: &str = "io.facelog.Kiosk1";
pub const OBJECT_PATH: &str = "/io/facelog/Kiosk1";

/// D-Bus interface for the facelog kiosk daemon.
///
/// Bus name: io.facelog.Kiosk1
/// Object path: /io/facelog/Kiosk1
pub struct KioskService {
    kiosk: Arc<Kiosk>,
}

impl KioskService {
    pub fn new(kiosk: Arc<Kiosk>) -> Self {
        Self { kiosk }
    }
}

fn to_json<T: Serialize>(value: &T) -> fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| fdo::Error::Failed(format!("serialization: {e}")))
}

fn camera_error(e: CameraError) -> fdo::Error {
    match e {
        CameraError::PermissionDenied(_) => fdo::Error::AccessDenied(e.to_string()),
        _ => fdo::Error::Failed(e.to_string()),
    }
}

fn kiosk_error(e: KioskError) -> fdo::Error {
    match e {
        KioskError::Validation(v) => fdo::Error::InvalidArgs(v.to_string()),
        KioskError::Camera(c) => camera_error(c),
        KioskError::Photo(p) => fdo::Error::InvalidArgs(format!("photo: {p}")),
        KioskError::Export(x) => fdo::Error::Failed(x.to_string()),
        other => fdo::Error::Failed(other.to_string()),
    }
}

#[interface(name = "io.facelog.Kiosk1")]
impl KioskService {
    /// Open the camera and start the scan loop. Returns the scanner snapshot.
    async fn start_scanner(&self) -> fdo::Result<String> {
        tracing::info!("start_scanner requested");
        match self.kiosk.start_scanner().await {
            Ok(snapshot) => to_json(&snapshot),
            Err(ScannerError::Camera(e)) => Err(camera_error(e)),
            Err(e) => Err(fdo::Error::Failed(e.to_string())),
        }
    }

    /// Stop the scan loop and release the camera. False if it was not running.
    async fn stop_scanner(&self) -> fdo::Result<bool> {
        tracing::info!("stop_scanner requested");
        Ok(self.kiosk.stop_scanner())
    }

    /// Register an employee. An empty `photo_path` captures from the camera.
    async fn register(&self, name: &str, role: &str, photo_path: &str) -> fdo::Result<String> {
        tracing::info!(name, role, from_file = !photo_path.is_empty(), "register requested");
        let photo = if photo_path.is_empty() {
            PhotoSource::Camera
        } else {
            PhotoSource::File(PathBuf::from(photo_path))
        };
        let user = self
            .kiosk
            .register(name, role, photo)
            .await
            .map_err(kiosk_error)?;
        to_json(&user)
    }

    /// Return daemon and scanner status.
    async fn status(&self) -> fdo::Result<String> {
        to_json(&self.kiosk.status().await)
    }

    /// List registered employees, without reference photos.
    async fn list_users(&self) -> fdo::Result<String> {
        to_json(&self.kiosk.users().await)
    }

    /// List attendance records, newest first.
    async fn list_records(&self) -> fdo::Result<String> {
        to_json(&self.kiosk.records().await)
    }

    /// Return the overview statistics.
    async fn dashboard(&self) -> fdo::Result<String> {
        to_json(&self.kiosk.dashboard().await)
    }

    /// Export the attendance history as CSV. Returns `(filename, content)`.
    async fn export_csv(&self) -> fdo::Result<(String, String)> {
        tracing::info!("export_csv requested");
        self.kiosk.export().await.map_err(kiosk_error)
    }
}
