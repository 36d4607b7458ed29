use crate::error::{Error, Result};

/// Login identity and the storage keys derived from it.
///
/// The email is trimmed and lowercased so the same person always maps to the
/// same keys regardless of how they typed it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    email: String,
}

impl Identity {
    pub fn from_email(email: &str) -> Result<Self> {
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return Err(Error::Validation("email is required".into()));
        }
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
            _ => {
                return Err(Error::Validation(format!(
                    "'{}' is not a valid email address",
                    email
                )))
            }
        }
        Ok(Self { email })
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn descriptor_key(&self) -> String {
        format!("faceDescriptor:{}", self.email)
    }

    pub fn profile_key(&self) -> String {
        format!("profile:{}", self.email)
    }

    pub fn settings_key(&self) -> String {
        format!("settings:{}", self.email)
    }
}
