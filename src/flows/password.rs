use log::info;

use crate::auth::{app_url, AuthProvider};
use crate::error::{Error, Result};
use crate::identity::Identity;

/// Send a reset link that lands on `<origin>/reset-password`.
pub fn forgot_password<P: AuthProvider + ?Sized>(auth: &P, origin: &str, email: &str) -> Result<()> {
    if email.trim().is_empty() {
        return Err(Error::Validation("please enter your email".into()));
    }
    let identity = Identity::from_email(email)?;
    auth.reset_password(identity.email(), Some(&app_url(origin, "/reset-password")))
        .map_err(Error::auth)?;
    info!("password reset link sent to {}", identity.email());
    Ok(())
}

/// Set a new password for the user who followed the reset link.
pub fn reset_password<P: AuthProvider + ?Sized>(
    auth: &P,
    password: &str,
    confirm_password: &str,
) -> Result<()> {
    if password.is_empty() || password != confirm_password {
        return Err(Error::Validation("passwords must match".into()));
    }
    auth.update_password(password).map_err(Error::auth)?;
    info!("password updated");
    Ok(())
}
