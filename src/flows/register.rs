use chrono::Utc;
use digid_vision::FaceDescriptor;
use log::{info, warn};

use crate::auth::{app_url, AuthProvider, User};
use crate::capture::{CaptureOutcome, CaptureResult, CapturedImage};
use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::profile::{Profile, ProfileStore};
use crate::storage::{DescriptorStore, KeyValueStore};

#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl Registration {
    /// Checks the form fields and returns the identity they describe.
    pub fn validate(&self) -> Result<Identity> {
        if self.full_name.trim().is_empty() || self.email.trim().is_empty() || self.password.is_empty()
        {
            return Err(Error::Validation(
                "please fill in all required fields".into(),
            ));
        }
        if self.password != self.confirm_password {
            return Err(Error::Validation("passwords do not match".into()));
        }
        Identity::from_email(&self.email)
    }
}

/// A face captured in enroll mode, ready to be stored as the reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrollment {
    pub descriptor: FaceDescriptor,
    pub photo: CapturedImage,
}

impl TryFrom<CaptureOutcome> for Enrollment {
    type Error = Error;

    fn try_from(outcome: CaptureOutcome) -> Result<Self> {
        match outcome.result {
            CaptureResult::Enrolled(descriptor) => Ok(Self {
                descriptor,
                photo: outcome.still,
            }),
            CaptureResult::Verified(_) => Err(Error::Validation(
                "a verification capture cannot be used for enrollment".into(),
            )),
        }
    }
}

/// Create the account, then keep the profile and reference face locally.
///
/// Nothing is written locally when sign-up fails, and a failed write leaves
/// neither the reference nor the profile behind.
pub fn register<P, S>(
    auth: &P,
    kv: S,
    origin: &str,
    form: &Registration,
    enrollment: Option<&Enrollment>,
) -> Result<User>
where
    P: AuthProvider + ?Sized,
    S: KeyValueStore + Clone,
{
    let identity = form.validate()?;
    let enrollment = enrollment.ok_or_else(|| {
        Error::Validation("please capture your face to continue".into())
    })?;
    let photo_png = enrollment.photo.to_png()?;

    let user = auth
        .sign_up(identity.email(), &form.password, &app_url(origin, "/login"))
        .map_err(Error::auth)?;

    let profile = Profile {
        full_name: form.full_name.trim().to_string(),
        email: identity.email().to_string(),
        phone: String::new(),
        photo_png,
        registered_at: Utc::now(),
    };
    let descriptors = DescriptorStore::new(kv.clone());
    descriptors.put(&identity, &enrollment.descriptor)?;
    if let Err(e) = ProfileStore::new(kv).put_profile(&identity, &profile) {
        // reference and profile are kept together or not at all
        if let Err(undo) = descriptors.remove(&identity) {
            warn!("could not roll back reference for {}: {}", identity.email(), undo);
        }
        return Err(e);
    }

    info!("registered {} ({})", identity.email(), user.id);
    Ok(user)
}
