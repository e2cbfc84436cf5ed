//! Scan loop controller.
//!
//! One camera session runs one loop task:
//!
//! ```text
//! idle ──start──▶ scanning ──▶ processing ──▶ cooldown ──▶ scanning ...
//!   ▲                                                         │
//!   └──────────────────────────stop───────────────────────────┘
//! ```
//!
//! Each session owns a `watch` stop channel that doubles as its liveness
//! flag. Stopping wakes a pending cooldown immediately; a recognition call
//! already in flight is left to finish, and its result is dropped because
//! every state write checks liveness first.

use crate::state::SharedState;
use crate::store::StoreError;
use chrono::{DateTime, Utc};
use facelog_core::policy::{self, CAPTURE_RETRY_DELAY, CHECK_IN_MESSAGE, FAILURE_COOLDOWN};
use facelog_core::{RecognitionRequest, RecognitionResult, Recognizer};
use facelog_hw::{CameraError, CameraProvider, FrameSource};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

const EMPTY_DATABASE_WARNING: &str = "Database is empty. Please register employees first.";

#[derive(Error, Debug)]
pub enum ScannerError {
    #[error("unable to access camera: {0}")]
    Camera(#[from] CameraError),
    #[error("capture failed: {0}")]
    Capture(String),
    #[error("recognition failed: {0}")]
    Recognition(String),
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("session stopped")]
    Stopped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanState {
    #[default]
    Idle,
    Scanning,
    Processing,
    Cooldown,
}

/// A transient message that disappears at `expires_at`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub message: String,
    pub expires_at: DateTime<Utc>,
}

impl Notice {
    fn new(message: impl Into<String>, now: DateTime<Utc>, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero());
        Self {
            message: message.into(),
            expires_at: now + ttl,
        }
    }
}

/// What the kiosk screen shows.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanSnapshot {
    pub state: ScanState,
    pub camera_active: bool,
    /// Most recent recognition answer, including demographic hints.
    pub last_result: Option<RecognitionResult>,
    /// Name of the last matched user, shown briefly after every match.
    pub match_flash: Option<Notice>,
    /// Check-in confirmation, shown only when a record was written.
    pub toast: Option<Notice>,
    pub next_cooldown_ms: Option<u64>,
    /// Non-fatal condition, such as an empty user database.
    pub warning: Option<String>,
    /// Persistent camera error from the last failed start.
    pub error: Option<String>,
}

impl ScanSnapshot {
    /// Copy of the snapshot with expired notices removed.
    pub fn current(&self, now: DateTime<Utc>) -> Self {
        let mut snapshot = self.clone();
        snapshot.match_flash = snapshot.match_flash.filter(|n| n.expires_at > now);
        snapshot.toast = snapshot.toast.filter(|n| n.expires_at > now);
        snapshot
    }
}

#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub max_references: usize,
    pub jpeg_quality: u8,
    pub recognition_timeout: Duration,
}

type SourceSlot = Arc<Mutex<Option<Box<dyn FrameSource>>>>;

struct Session {
    stop: watch::Sender<bool>,
    source: SourceSlot,
    task: JoinHandle<()>,
}

/// Owns the camera session and the scan loop task.
pub struct Scanner {
    state: SharedState,
    recognizer: Arc<dyn Recognizer>,
    camera: Arc<dyn CameraProvider>,
    settings: ScanSettings,
    status: Arc<watch::Sender<ScanSnapshot>>,
    session: Mutex<Option<Session>>,
}

impl Scanner {
    pub fn new(
        state: SharedState,
        recognizer: Arc<dyn Recognizer>,
        camera: Arc<dyn CameraProvider>,
        settings: ScanSettings,
    ) -> Self {
        let (status, _) = watch::channel(ScanSnapshot::default());
        Self {
            state,
            recognizer,
            camera,
            settings,
            status: Arc::new(status),
            session: Mutex::new(None),
        }
    }

    pub fn camera_provider(&self) -> Arc<dyn CameraProvider> {
        self.camera.clone()
    }

    pub fn is_running(&self) -> bool {
        self.lock_session().is_some()
    }

    pub fn snapshot(&self) -> ScanSnapshot {
        self.status.borrow().current(Utc::now())
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the camera and start the scan loop. Starting a running scanner
    /// is a no-op.
    pub async fn start(&self) -> Result<(), ScannerError> {
        if self.is_running() {
            return Ok(());
        }

        let provider = self.camera.clone();
        let opened = tokio::task::spawn_blocking(move || provider.open())
            .await
            .map_err(|e| ScannerError::Capture(format!("camera open task failed: {e}")))?;

        let source = match opened {
            Ok(source) => source,
            Err(e) => {
                tracing::error!(error = %e, "camera unavailable; scanner not started");
                let message = format!("Unable to access camera: {e}");
                self.status.send_modify(|s| {
                    *s = ScanSnapshot {
                        error: Some(message),
                        ..ScanSnapshot::default()
                    };
                });
                return Err(e.into());
            }
        };

        let mut session = self.lock_session();
        if session.is_some() {
            // Lost a start race; the other session keeps the camera.
            return Ok(());
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let slot: SourceSlot = Arc::new(Mutex::new(Some(source)));

        self.status.send_modify(|s| {
            *s = ScanSnapshot {
                state: ScanState::Scanning,
                camera_active: true,
                ..ScanSnapshot::default()
            };
        });

        let scan_loop = ScanLoop {
            state: self.state.clone(),
            recognizer: self.recognizer.clone(),
            settings: self.settings.clone(),
            status: self.status.clone(),
            source: slot.clone(),
            stop: stop_rx,
        };
        let task = tokio::spawn(scan_loop.run());

        *session = Some(Session {
            stop: stop_tx,
            source: slot,
            task,
        });
        tracing::info!("scanner started");
        Ok(())
    }

    /// Stop the session: release the camera, clear notices, go idle.
    ///
    /// Returns the loop task so callers can wait for it to wind down, or
    /// `None` if the scanner was not running.
    pub fn stop(&self) -> Option<JoinHandle<()>> {
        let session = self.lock_session().take()?;
        session.stop.send_replace(true);
        let released = session
            .source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(released);

        self.status.send_modify(|s| {
            s.state = ScanState::Idle;
            s.camera_active = false;
            s.match_flash = None;
            s.toast = None;
            s.next_cooldown_ms = None;
            s.warning = None;
        });
        tracing::info!("scanner stopped; camera released");
        Some(session.task)
    }
}

struct ScanLoop {
    state: SharedState,
    recognizer: Arc<dyn Recognizer>,
    settings: ScanSettings,
    status: Arc<watch::Sender<ScanSnapshot>>,
    source: SourceSlot,
    stop: watch::Receiver<bool>,
}

impl ScanLoop {
    async fn run(mut self) {
        tracing::debug!("scan loop started");
        loop {
            if !self.wait_for_candidates().await {
                break;
            }
            let Some(cooldown) = self.process_once().await else {
                break;
            };

            let published = self.publish(|s| {
                s.state = ScanState::Cooldown;
                s.next_cooldown_ms = Some(cooldown.as_millis() as u64);
            });
            if !published {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(cooldown) => {}
                _ = self.stop.changed() => {}
            }

            if !self.publish(|s| s.state = ScanState::Scanning) {
                break;
            }
        }
        tracing::debug!("scan loop exited");
    }

    /// Live until stop is sent or the scanner is dropped.
    fn is_live(&self) -> bool {
        !*self.stop.borrow() && self.stop.has_changed().is_ok()
    }

    /// Apply `f` to the snapshot unless the session has ended. The check
    /// runs under the snapshot lock so a stop cannot be overwritten.
    fn publish(&self, f: impl FnOnce(&mut ScanSnapshot)) -> bool {
        let mut applied = false;
        self.status.send_if_modified(|s| {
            if self.is_live() {
                f(s);
                applied = true;
            }
            applied
        });
        applied
    }

    /// Park in `scanning` until at least one user is registered.
    async fn wait_for_candidates(&mut self) -> bool {
        loop {
            if !self.is_live() {
                return false;
            }
            let mut users_rx = {
                let state = self.state.lock().await;
                if !state.users().is_empty() {
                    self.publish(|s| s.warning = None);
                    return true;
                }
                state.subscribe_users()
            };

            tracing::info!("no registered users; scanning paused");
            self.publish(|s| s.warning = Some(EMPTY_DATABASE_WARNING.to_string()));
            tokio::select! {
                changed = users_rx.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
                _ = self.stop.changed() => {}
            }
        }
    }

    /// Run one capture → recognize → decide step. Returns the cooldown to
    /// apply, or `None` once the session is no longer live.
    async fn process_once(&mut self) -> Option<Duration> {
        if !self.publish(|s| s.state = ScanState::Processing) {
            return None;
        }

        let jpeg = match self.capture().await {
            Ok(jpeg) => jpeg,
            Err(e) => {
                tracing::debug!(error = %e, "no frame available");
                return Some(CAPTURE_RETRY_DELAY);
            }
        };

        let request = {
            let state = self.state.lock().await;
            RecognitionRequest::new(jpeg, state.users(), self.settings.max_references)
        };

        let outcome = match self.recognize(request).await {
            Ok(result) => self.apply(result).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(cooldown) => Some(cooldown),
            Err(ScannerError::Stopped) => {
                tracing::debug!("session stopped during recognition; result discarded");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "scan failed");
                self.is_live().then_some(FAILURE_COOLDOWN)
            }
        }
    }

    async fn capture(&self) -> Result<Vec<u8>, ScannerError> {
        let slot = self.source.clone();
        let quality = self.settings.jpeg_quality;
        tokio::task::spawn_blocking(move || {
            let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            let source = guard
                .as_mut()
                .ok_or_else(|| ScannerError::Capture("camera released".into()))?;
            let frame = source
                .capture_still()
                .map_err(|e| ScannerError::Capture(e.to_string()))?;
            frame
                .to_jpeg(quality)
                .map_err(|e| ScannerError::Capture(e.to_string()))
        })
        .await
        .map_err(|e| ScannerError::Capture(format!("capture task failed: {e}")))?
    }

    async fn recognize(&self, request: RecognitionRequest) -> Result<RecognitionResult, ScannerError> {
        let recognizer = self.recognizer.clone();
        let mut task = tokio::spawn(async move { recognizer.identify(request).await });
        match tokio::time::timeout(self.settings.recognition_timeout, &mut task).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(ScannerError::Recognition(format!("task failed: {e}"))),
            Err(_) => {
                task.abort();
                Err(ScannerError::Recognition("timed out".into()))
            }
        }
    }

    /// Turn a recognition answer into notices and, at most, one record.
    async fn apply(&self, result: RecognitionResult) -> Result<Duration, ScannerError> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        if !self.is_live() {
            return Err(ScannerError::Stopped);
        }

        let decision = policy::decide(&result, state.users(), state.records(), now);
        let matched = decision.matched.clone();
        self.publish(|s| {
            s.last_result = Some(result);
            if let Some(user) = matched {
                s.match_flash = Some(Notice::new(user.name, now, policy::MATCH_FLASH_DURATION));
            }
        });

        if let Some(record) = decision.record {
            state.record_attendance(record)?;
            self.publish(|s| {
                s.toast = Some(Notice::new(CHECK_IN_MESSAGE, now, policy::CHECK_IN_TOAST_DURATION));
            });
        }

        Ok(decision.cooldown)
    }
}
