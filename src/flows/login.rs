use log::{info, warn};

use crate::auth::{AuthProvider, Session};
use crate::error::{Error, Result};
use crate::flows::NextStep;
use crate::identity::Identity;
use crate::storage::{DescriptorStore, KeyValueStore};

pub const MAX_LOGIN_ATTEMPTS: u32 = 5;

/// Password sign-in with a per-flow failure counter.
///
/// Every rejected attempt counts, including a malformed email. The counter
/// lives only as long as the flow. Once it reaches
/// [`MAX_LOGIN_ATTEMPTS`] a reset email is sent and every further attempt is
/// refused without contacting the provider.
#[derive(Debug)]
pub struct LoginFlow<P, S> {
    auth: P,
    descriptors: DescriptorStore<S>,
    failed_attempts: u32,
    locked: bool,
}

/// A successful sign-in and where to go next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSuccess {
    pub session: Session,
    pub identity: Identity,
    pub next: NextStep,
}

impl<P: AuthProvider, S: KeyValueStore> LoginFlow<P, S> {
    pub fn new(auth: P, kv: S) -> Self {
        Self {
            auth,
            descriptors: DescriptorStore::new(kv),
            failed_attempts: 0,
            locked: false,
        }
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn remaining_attempts(&self) -> u32 {
        MAX_LOGIN_ATTEMPTS.saturating_sub(self.failed_attempts)
    }

    pub fn login(&mut self, email: &str, password: &str) -> Result<LoginSuccess> {
        if self.locked {
            return Err(Error::Locked);
        }
        if email.trim().is_empty() || password.is_empty() {
            return Err(Error::MissingCredentials);
        }
        let identity = match Identity::from_email(email) {
            Ok(identity) => identity,
            Err(e) => return Err(self.record_failure(email.trim(), None, e.to_string())),
        };

        let session = match self.auth.sign_in(identity.email(), password) {
            Ok(session) => session,
            Err(e) => {
                let message = format!("{:#}", e);
                return Err(self.record_failure(identity.email(), Some(&identity), message));
            }
        };
        self.failed_attempts = 0;

        let next = if self.descriptors.contains(&identity)? {
            NextStep::FaceVerification
        } else {
            NextStep::Dashboard
        };
        info!("{} signed in, next: {:?}", identity.email(), next);
        Ok(LoginSuccess {
            session,
            identity,
            next,
        })
    }

    /// Count a rejected attempt. The unlock email only goes to a well-formed address.
    fn record_failure(
        &mut self,
        email: &str,
        identity: Option<&Identity>,
        message: String,
    ) -> Error {
        self.failed_attempts += 1;
        warn!(
            "sign-in failed for {} ({}/{})",
            email, self.failed_attempts, MAX_LOGIN_ATTEMPTS
        );
        if self.failed_attempts < MAX_LOGIN_ATTEMPTS {
            return Error::InvalidCredentials {
                message,
                remaining: self.remaining_attempts(),
            };
        }
        self.locked = true;
        match identity {
            Some(identity) => {
                if let Err(e) = self.auth.reset_password(identity.email(), None) {
                    warn!("could not send unlock email to {}: {:#}", identity.email(), e);
                }
            }
            None => warn!("locked after malformed email {:?}, no unlock email sent", email),
        }
        Error::Locked
    }
}
