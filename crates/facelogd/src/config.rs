use chrono::{FixedOffset, Offset, Utc};
use std::path::PathBuf;
use std::time::Duration;

/// Headroom the scan loop grants a recognition task beyond the HTTP timeout.
const RECOGNITION_TASK_MARGIN: Duration = Duration::from_secs(2);

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Path to the SQLite database holding the two collections.
    pub db_path: PathBuf,
    /// API key for the recognition service.
    pub api_key: String,
    /// Base URL of the recognition service.
    pub api_base: String,
    /// Generative model used for recognition.
    pub model: String,
    /// HTTP timeout for one recognition call.
    pub request_timeout_secs: u64,
    /// Number of reference images sent with each recognition request.
    pub max_references: usize,
    /// Number of warmup frames to discard when the camera opens.
    pub warmup_frames: usize,
    /// JPEG quality for captured frames and reference photos.
    pub jpeg_quality: u8,
    /// Local offset used for reports and export, in minutes east of UTC.
    pub utc_offset_minutes: i32,
}

impl Config {
    /// Load configuration from `FACELOG_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facelog");

        let db_path = std::env::var("FACELOG_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("attendance.db"));

        let api_key = ["FACELOG_API_KEY", "GEMINI_API_KEY", "API_KEY"]
            .iter()
            .find_map(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
            .unwrap_or_default();

        Self {
            camera_device: std::env::var("FACELOG_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            db_path,
            api_key,
            api_base: std::env::var("FACELOG_API_BASE")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string()),
            model: std::env::var("FACELOG_MODEL")
                .unwrap_or_else(|_| "gemini-2.5-flash".to_string()),
            request_timeout_secs: env_parse("FACELOG_REQUEST_TIMEOUT_SECS", 20),
            max_references: env_parse(
                "FACELOG_MAX_REFERENCES",
                facelog_core::recognition::MAX_REFERENCE_IMAGES,
            ),
            warmup_frames: env_parse("FACELOG_WARMUP_FRAMES", 4),
            jpeg_quality: env_parse("FACELOG_JPEG_QUALITY", 80),
            utc_offset_minutes: env_parse("FACELOG_UTC_OFFSET_MINUTES", 0),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Deadline for the whole recognition task in the scan loop.
    ///
    /// A slow service trips the HTTP timeout first and reads as a non-match;
    /// only a recognizer stuck past this deadline takes the failure cooldown.
    pub fn recognition_task_timeout(&self) -> Duration {
        self.request_timeout() + RECOGNITION_TASK_MARGIN
    }

    /// Offset for reports; out-of-range values fall back to UTC.
    pub fn utc_offset(&self) -> FixedOffset {
        offset_from_minutes(self.utc_offset_minutes)
    }
}

fn offset_from_minutes(minutes: i32) -> FixedOffset {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| {
            tracing::warn!(minutes, "UTC offset out of range; using UTC");
            Utc.fix()
        })
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_from_minutes() {
        assert_eq!(offset_from_minutes(120).local_minus_utc(), 7200);
        assert_eq!(offset_from_minutes(-300).local_minus_utc(), -18000);
        assert_eq!(offset_from_minutes(100_000).local_minus_utc(), 0);
    }

    fn config_with_timeout(secs: u64) -> Config {
        Config {
            camera_device: "/dev/video0".into(),
            db_path: PathBuf::from("/tmp/facelog-test.db"),
            api_key: String::new(),
            api_base: "http://127.0.0.1:1".into(),
            model: "m".into(),
            request_timeout_secs: secs,
            max_references: 5,
            warmup_frames: 0,
            jpeg_quality: 80,
            utc_offset_minutes: 0,
        }
    }

    #[test]
    fn test_task_timeout_outlasts_http_timeout() {
        let config = config_with_timeout(20);
        assert_eq!(config.request_timeout(), Duration::from_secs(20));
        assert!(config.recognition_task_timeout() > config.request_timeout());

        let zero = config_with_timeout(0);
        assert_eq!(zero.request_timeout(), Duration::from_secs(1));
        assert_eq!(zero.recognition_task_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_env_parse_default_on_garbage() {
        std::env::set_var("FACELOG_TEST_PARSE_GARBAGE", "not-a-number");
        assert_eq!(env_parse("FACELOG_TEST_PARSE_GARBAGE", 7usize), 7);
        std::env::set_var("FACELOG_TEST_PARSE_OK", "12");
        assert_eq!(env_parse("FACELOG_TEST_PARSE_OK", 7usize), 12);
    }
}
