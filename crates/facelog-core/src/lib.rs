//! facelog-core: attendance data model and kiosk logic.
//!
//! Face matching is delegated to a remote service behind [`Recognizer`];
//! this crate holds the decisions made around it (thresholds, cooldowns,
//! dedup), the registration form, and the reporting views.

pub mod export;
pub mod policy;
pub mod recognition;
pub mod registration;
pub mod report;
pub mod types;

pub use recognition::{RecognitionRequest, Recognizer, ReferenceImage};
pub use types::{
    AttendanceRecord, AttendanceStatus, Demographics, RecognitionResult, User, UserSummary,
};
