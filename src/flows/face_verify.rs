use digid_vision::{Camera, FaceAnalyzer, FaceDescriptor};
use log::{info, warn};

use crate::auth::{require_user, AuthProvider, User};
use crate::capture::{CaptureController, CaptureMode, CaptureOutcome, CaptureResult};
use crate::error::{Error, Result};
use crate::flows::NextStep;
use crate::identity::Identity;
use crate::matcher::Verdict;
use crate::storage::{DescriptorStore, KeyValueStore};

/// Second factor after a password sign-in.
#[derive(Debug, Clone)]
pub struct FaceVerification {
    user: User,
    identity: Identity,
    reference: Option<FaceDescriptor>,
}

impl FaceVerification {
    /// Look up the reference for `email`, or for the signed-in user when `None`.
    pub fn start<P, S>(auth: &P, kv: S, email: Option<&str>) -> Result<Self>
    where
        P: AuthProvider + ?Sized,
        S: KeyValueStore,
    {
        let user = require_user(auth)?;
        let identity = Identity::from_email(email.unwrap_or(&user.email))?;
        let reference = DescriptorStore::new(kv).get(&identity)?;
        if reference.is_none() {
            warn!("no face data for {}, enrollment needed", identity.email());
        }
        Ok(Self {
            user,
            identity,
            reference,
        })
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// `Some(Enroll)` when there is nothing to verify against.
    pub fn precheck(&self) -> Option<NextStep> {
        self.reference.is_none().then_some(NextStep::Enroll)
    }

    pub fn capture_mode(&self) -> CaptureMode {
        CaptureMode::Verify {
            reference: self.reference.clone(),
        }
    }

    /// Capture once with `controller` and decide the next step.
    pub fn verify_with<C: Camera, A: FaceAnalyzer>(
        &self,
        controller: &mut CaptureController<C, A>,
    ) -> Result<NextStep> {
        controller.set_mode(self.capture_mode())?;
        let outcome = controller.capture()?;
        self.conclude(&outcome)
    }

    pub fn conclude(&self, outcome: &CaptureOutcome) -> Result<NextStep> {
        let CaptureResult::Verified(verdict) = &outcome.result else {
            return Err(Error::Validation(
                "an enrollment capture cannot verify a face".into(),
            ));
        };
        let next = match verdict {
            Verdict::Match(o) => {
                info!("face verified for {} (distance {:.3})", self.identity.email(), o.distance);
                NextStep::Dashboard
            }
            Verdict::Mismatch(o) => {
                warn!("face mismatch for {} (distance {:.3})", self.identity.email(), o.distance);
                NextStep::Retry
            }
            Verdict::NoReference(_) => NextStep::Enroll,
        };
        Ok(next)
    }
}
