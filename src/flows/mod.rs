//! User-facing flows built on the auth boundary, the capture controller and
//! the local stores.

pub mod face_verify;
pub mod login;
pub mod password;
pub mod register;
pub mod settings;

pub use face_verify::FaceVerification;
pub use login::{LoginFlow, MAX_LOGIN_ATTEMPTS};
pub use password::{forgot_password, reset_password};
pub use register::{register, Enrollment, Registration};
pub use settings::{
    delete_account, send_unlock_email, sign_out, update_profile, update_security, ProfileUpdate,
};

/// Where the user goes after a flow step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    /// Password accepted and a reference face exists.
    FaceVerification,
    Dashboard,
    /// No reference face is stored for this identity.
    Enroll,
    Login,
    /// The face did not match; capture again.
    Retry,
}
