//! Employee registration form.

use crate::recognition::strip_data_url;
use crate::types::User;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("name is required")]
    MissingName,
    #[error("role is required")]
    MissingRole,
    #[error("a reference photo is required")]
    MissingPhoto,
}

/// Registration form state. Fields are filled in any order; [`submit`]
/// validates them and resets the form on success.
///
/// [`submit`]: RegistrationForm::submit
#[derive(Debug, Default, Clone)]
pub struct RegistrationForm {
    pub name: String,
    pub role: String,
    photo_base64: Option<String>,
}

impl RegistrationForm {
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            photo_base64: None,
        }
    }

    /// Attach the captured reference photo (base64 JPEG, data URL accepted).
    pub fn set_photo(&mut self, photo_base64: impl Into<String>) {
        let photo = photo_base64.into();
        self.photo_base64 = Some(strip_data_url(&photo).to_string());
    }

    /// Drop the current photo so another one can be captured.
    pub fn retake(&mut self) {
        self.photo_base64 = None;
    }

    pub fn has_photo(&self) -> bool {
        self.photo_base64.as_deref().is_some_and(|p| !p.is_empty())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingName);
        }
        if self.role.trim().is_empty() {
            return Err(ValidationError::MissingRole);
        }
        if !self.has_photo() {
            return Err(ValidationError::MissingPhoto);
        }
        Ok(())
    }

    /// Validate and build a new [`User`] with a fresh id, then reset the form.
    pub fn submit(&mut self, now: DateTime<Utc>) -> Result<User, ValidationError> {
        self.validate()?;
        let form = std::mem::take(self);
        Ok(User {
            id: uuid::Uuid::new_v4().to_string(),
            name: form.name.trim().to_string(),
            role: form.role.trim().to_string(),
            registered_at: now,
            photo_base64: form.photo_base64.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_builds_user_and_resets() {
        let mut form = RegistrationForm::new(" Grace Hopper ", "Admiral");
        form.set_photo("data:image/jpeg;base64,QUJD");
        let now = Utc::now();

        let user = form.submit(now).unwrap();
        assert_eq!(user.name, "Grace Hopper");
        assert_eq!(user.role, "Admiral");
        assert_eq!(user.photo_base64, "QUJD");
        assert_eq!(user.registered_at, now);
        assert!(uuid::Uuid::parse_str(&user.id).is_ok());

        assert!(form.name.is_empty());
        assert!(form.role.is_empty());
        assert!(!form.has_photo());
    }

    #[test]
    fn test_ids_are_unique() {
        let mut a = RegistrationForm::new("A", "r");
        a.set_photo("X");
        let mut b = RegistrationForm::new("A", "r");
        b.set_photo("X");
        let now = Utc::now();
        assert_ne!(a.submit(now).unwrap().id, b.submit(now).unwrap().id);
    }

    #[test]
    fn test_validation_order() {
        let mut form = RegistrationForm::default();
        assert_eq!(form.validate(), Err(ValidationError::MissingName));
        form.name = "Ada".into();
        assert_eq!(form.validate(), Err(ValidationError::MissingRole));
        form.role = "  ".into();
        assert_eq!(form.validate(), Err(ValidationError::MissingRole));
        form.role = "Analyst".into();
        assert_eq!(form.validate(), Err(ValidationError::MissingPhoto));
        form.set_photo("QUJD");
        assert_eq!(form.validate(), Ok(()));
    }

    #[test]
    fn test_failed_submit_keeps_form() {
        let mut form = RegistrationForm::new("Ada", "Analyst");
        assert_eq!(form.submit(Utc::now()).unwrap_err(), ValidationError::MissingPhoto);
        assert_eq!(form.name, "Ada");
    }

    #[test]
    fn test_retake_clears_photo() {
        let mut form = RegistrationForm::new("Ada", "Analyst");
        form.set_photo("QUJD");
        form.retake();
        assert!(!form.has_photo());
    }
}
