//! Recognition service seam.
//!
//! The face match itself happens in a remote service; this module only
//! defines what goes over the boundary and the trait the scan loop calls.

use crate::types::{RecognitionResult, User};
use async_trait::async_trait;

/// Default cap on reference images sent with one request.
pub const MAX_REFERENCE_IMAGES: usize = 5;

/// One labeled reference image.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceImage {
    pub id: String,
    /// Base64-encoded JPEG.
    pub image_base64: String,
}

/// A single recognition request: the target frame and an ordered,
/// bounded list of references.
#[derive(Debug, Clone)]
pub struct RecognitionRequest {
    /// Raw JPEG bytes of the captured frame.
    pub target_jpeg: Vec<u8>,
    pub references: Vec<ReferenceImage>,
}

impl RecognitionRequest {
    /// Build a request from the registered users, keeping the first `cap`
    /// in registration order.
    pub fn new(target_jpeg: Vec<u8>, users: &[User], cap: usize) -> Self {
        let references = users
            .iter()
            .take(cap)
            .map(|u| ReferenceImage {
                id: u.id.clone(),
                image_base64: strip_data_url(&u.photo_base64).to_string(),
            })
            .collect();
        Self {
            target_jpeg,
            references,
        }
    }
}

/// Remote face matcher.
///
/// Implementations must never fail: transport and parse errors resolve to
/// [`RecognitionResult::no_match`].
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn identify(&self, request: RecognitionRequest) -> RecognitionResult;
}

/// Strip a `data:image/<type>;base64,` prefix if present.
pub fn strip_data_url(encoded: &str) -> &str {
    for kind in ["png", "jpeg", "jpg", "webp"] {
        let prefix = format!("data:image/{kind};base64,");
        if let Some(rest) = encoded.strip_prefix(prefix.as_str()) {
            return rest;
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(id: &str) -> User {
        User {
            id: id.into(),
            name: format!("name-{id}"),
            role: "staff".into(),
            registered_at: Utc::now(),
            photo_base64: format!("data:image/jpeg;base64,PHOTO{id}"),
        }
    }

    #[test]
    fn test_request_caps_references_in_order() {
        let users: Vec<User> = (0..8).map(|i| user(&i.to_string())).collect();
        let req = RecognitionRequest::new(vec![1, 2, 3], &users, MAX_REFERENCE_IMAGES);
        assert_eq!(req.references.len(), 5);
        let ids: Vec<&str> = req.references.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["0", "1", "2", "3", "4"]);
        assert_eq!(req.references[0].image_base64, "PHOTO0");
    }

    #[test]
    fn test_request_fewer_users_than_cap() {
        let users = vec![user("a")];
        let req = RecognitionRequest::new(Vec::new(), &users, MAX_REFERENCE_IMAGES);
        assert_eq!(req.references.len(), 1);
    }

    #[test]
    fn test_strip_data_url() {
        assert_eq!(strip_data_url("data:image/png;base64,AAAA"), "AAAA");
        assert_eq!(strip_data_url("data:image/webp;base64,BB"), "BB");
        assert_eq!(strip_data_url("CCCC"), "CCCC");
        assert_eq!(strip_data_url("data:text/plain;base64,DD"), "data:text/plain;base64,DD");
    }
}
