use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered employee with one reference photo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub role: String,
    pub registered_at: DateTime<Utc>,
    /// Base64-encoded JPEG, without a `data:` URL prefix.
    pub photo_base64: String,
}

/// Listing view of a [`User`] that leaves out the reference photo.
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: String,
    pub name: String,
    pub role: String,
    pub registered_at: DateTime<Utc>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            role: user.role.clone(),
            registered_at: user.registered_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Late,
    Excused,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Late => "Late",
            AttendanceStatus::Excused => "Excused",
        }
    }
}

/// One check-in event. Records are append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: String,
    pub user_id: String,
    /// Copy of the user's name at check-in time.
    pub user_name: String,
    pub timestamp: DateTime<Utc>,
    pub status: AttendanceStatus,
    /// Match confidence in [0, 1].
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
}

/// Demographic hints estimated by the recognition service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Demographics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

/// Structured answer of the recognition service, in its wire form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionResult {
    pub match_found: bool,
    #[serde(default)]
    pub match_id: Option<String>,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demographics: Option<Demographics>,
}

impl RecognitionResult {
    /// The safe default every failed recognition resolves to.
    pub fn no_match() -> Self {
        Self {
            match_found: false,
            match_id: None,
            confidence: 0.0,
            demographics: None,
        }
    }

    /// Clamp confidence into [0, 1]; non-finite values become 0.
    pub fn normalized(mut self) -> Self {
        self.confidence = if self.confidence.is_finite() {
            self.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        if self.match_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            self.match_id = None;
        }
        self
    }

    pub fn expression(&self) -> Option<&str> {
        self.demographics.as_ref()?.expression.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognition_result_wire_form() {
        let json = r#"{"matchFound":true,"matchId":"u1","confidence":0.9,
            "demographics":{"age_range":"25-35","expression":"happy"}}"#;
        let result: RecognitionResult = serde_json::from_str(json).unwrap();
        assert!(result.match_found);
        assert_eq!(result.match_id.as_deref(), Some("u1"));
        assert_eq!(result.expression(), Some("happy"));
        assert_eq!(
            result.demographics.as_ref().and_then(|d| d.age_range.as_deref()),
            Some("25-35")
        );
    }

    #[test]
    fn test_recognition_result_optional_fields() {
        let result: RecognitionResult =
            serde_json::from_str(r#"{"matchFound":false,"confidence":0.1}"#).unwrap();
        assert_eq!(result.match_id, None);
        assert_eq!(result.demographics, None);
        assert_eq!(result.expression(), None);
    }

    #[test]
    fn test_recognition_result_missing_required_field() {
        assert!(serde_json::from_str::<RecognitionResult>(r#"{"matchFound":true}"#).is_err());
    }

    #[test]
    fn test_normalized_clamps_confidence() {
        let mut result = RecognitionResult::no_match();
        result.confidence = 1.7;
        assert_eq!(result.normalized().confidence, 1.0);

        let mut result = RecognitionResult::no_match();
        result.confidence = f64::NAN;
        assert_eq!(result.normalized().confidence, 0.0);

        let mut result = RecognitionResult::no_match();
        result.match_id = Some("  ".into());
        assert_eq!(result.normalized().match_id, None);
    }

    #[test]
    fn test_status_serializes_as_label() {
        let json = serde_json::to_string(&AttendanceStatus::Present).unwrap();
        assert_eq!(json, "\"Present\"");
        assert_eq!(AttendanceStatus::Excused.as_str(), "Excused");
    }
}
