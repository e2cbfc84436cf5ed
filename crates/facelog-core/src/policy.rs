//! Scan cycle decisions: confidence threshold, tiered cooldowns, dedup.
//!
//! Everything here is a pure function of the recognition result, the two
//! collections and the current time, so the scan loop only has to carry
//! out what [`decide`] returns.

use crate::types::{AttendanceRecord, AttendanceStatus, RecognitionResult, User};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// A match must be strictly above this confidence to count.
pub const MATCH_THRESHOLD: f64 = 0.65;

/// Repeat recognitions of one user inside this window create no record.
pub const DEDUP_WINDOW_MS: i64 = 60_000;

pub const CAPTURE_RETRY_DELAY: Duration = Duration::from_millis(500);
pub const NO_MATCH_COOLDOWN: Duration = Duration::from_millis(3500);
pub const FAILURE_COOLDOWN: Duration = Duration::from_millis(4000);

/// How long the "match" flash stays up.
pub const MATCH_FLASH_DURATION: Duration = Duration::from_millis(2000);
/// How long the check-in toast stays up.
pub const CHECK_IN_TOAST_DURATION: Duration = Duration::from_millis(3000);

pub const CHECK_IN_MESSAGE: &str = "Check-in Successful";

/// Cooldown after an accepted match, stepped by confidence.
pub fn match_cooldown(confidence: f64) -> Duration {
    let ms = if confidence > 0.85 {
        1200
    } else if confidence > 0.75 {
        2000
    } else {
        3000
    };
    Duration::from_millis(ms)
}

/// Most recent record for a user, by timestamp.
pub fn last_record_for<'a>(
    records: &'a [AttendanceRecord],
    user_id: &str,
) -> Option<&'a AttendanceRecord> {
    records
        .iter()
        .filter(|r| r.user_id == user_id)
        .max_by_key(|r| r.timestamp)
}

/// True if the user already has a record inside the dedup window.
pub fn is_duplicate(records: &[AttendanceRecord], user_id: &str, now: DateTime<Utc>) -> bool {
    last_record_for(records, user_id)
        .map(|last| (now - last.timestamp).num_milliseconds() < DEDUP_WINDOW_MS)
        .unwrap_or(false)
}

/// The user a cycle matched.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedUser {
    pub id: String,
    pub name: String,
}

/// What the scan loop should do after one recognition response.
#[derive(Debug, Clone)]
pub struct Decision {
    pub cooldown: Duration,
    /// Set for every accepted match, whether or not a record is written.
    pub matched: Option<MatchedUser>,
    /// The record to append, unless suppressed by dedup.
    pub record: Option<AttendanceRecord>,
}

impl Decision {
    fn no_match() -> Self {
        Self {
            cooldown: NO_MATCH_COOLDOWN,
            matched: None,
            record: None,
        }
    }
}

/// Decide the outcome of one recognition response.
pub fn decide(
    result: &RecognitionResult,
    users: &[User],
    records: &[AttendanceRecord],
    now: DateTime<Utc>,
) -> Decision {
    if !result.match_found || result.confidence <= MATCH_THRESHOLD {
        return Decision::no_match();
    }
    let Some(match_id) = result.match_id.as_deref() else {
        return Decision::no_match();
    };
    let Some(user) = users.iter().find(|u| u.id == match_id) else {
        tracing::debug!(match_id, "match id does not resolve to a registered user");
        return Decision::no_match();
    };

    let matched = MatchedUser {
        id: user.id.clone(),
        name: user.name.clone(),
    };

    let record = if is_duplicate(records, &user.id, now) {
        tracing::debug!(user_id = %user.id, "inside dedup window; no record");
        None
    } else {
        Some(AttendanceRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            user_name: user.name.clone(),
            timestamp: now,
            status: AttendanceStatus::Present,
            confidence: result.confidence,
            mood: result.expression().map(str::to_string),
        })
    };

    Decision {
        cooldown: match_cooldown(result.confidence),
        matched: Some(matched),
        record,
    }
}
