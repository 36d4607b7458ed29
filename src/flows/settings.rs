use chrono::Utc;
use log::{info, warn};

use crate::auth::{require_user, AuthProvider, User};
use crate::error::{Error, Result};
use crate::flows::NextStep;
use crate::identity::Identity;
use crate::profile::{Profile, ProfileStore, SecuritySettings};
use crate::storage::{DescriptorStore, KeyValueStore};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub full_name: String,
    pub phone: String,
}

fn signed_in<P: AuthProvider + ?Sized>(auth: &P) -> Result<(User, Identity)> {
    let user = require_user(auth)?;
    let identity = Identity::from_email(&user.email)?;
    Ok((user, identity))
}

/// Push the new name and phone to the provider, then mirror them locally.
///
/// A user without a local profile gets one without a photo.
pub fn update_profile<P, S>(auth: &P, kv: S, update: &ProfileUpdate) -> Result<Profile>
where
    P: AuthProvider + ?Sized,
    S: KeyValueStore,
{
    let (_, identity) = signed_in(auth)?;
    let full_name = update.full_name.trim();
    let phone = update.phone.trim();
    auth.update_user(full_name, phone).map_err(Error::auth)?;

    let profiles = ProfileStore::new(kv);
    let mut profile = profiles.profile(&identity)?.unwrap_or_else(|| Profile {
        full_name: String::new(),
        email: identity.email().to_string(),
        phone: String::new(),
        photo_png: Vec::new(),
        registered_at: Utc::now(),
    });
    profile.full_name = full_name.to_string();
    profile.phone = phone.to_string();
    profiles.put_profile(&identity, &profile)?;
    info!("profile updated for {}", identity.email());
    Ok(profile)
}

pub fn update_security<P, S>(auth: &P, kv: S, settings: &SecuritySettings) -> Result<()>
where
    P: AuthProvider + ?Sized,
    S: KeyValueStore,
{
    let (_, identity) = signed_in(auth)?;
    ProfileStore::new(kv).put_settings(&identity, settings)?;
    info!("security settings saved for {}: {:?}", identity.email(), settings);
    Ok(())
}

/// Send the signed-in user an unlock (password reset) email.
pub fn send_unlock_email<P: AuthProvider + ?Sized>(auth: &P) -> Result<()> {
    let (_, identity) = signed_in(auth)?;
    auth.reset_password(identity.email(), None)
        .map_err(Error::auth)?;
    info!("unlock email sent to {}", identity.email());
    Ok(())
}

pub fn sign_out<P: AuthProvider + ?Sized>(auth: &P) -> Result<NextStep> {
    auth.sign_out().map_err(Error::auth)?;
    info!("signed out");
    Ok(NextStep::Login)
}

/// Confirm `password`, wipe everything kept on this device and end the session.
///
/// A wrong password leaves the account, the local data and the session as they were.
pub fn delete_account<P, S>(auth: &P, kv: S, password: &str) -> Result<NextStep>
where
    P: AuthProvider + ?Sized,
    S: KeyValueStore + Clone,
{
    if password.is_empty() {
        return Err(Error::Validation(
            "please enter your password to delete your account".into(),
        ));
    }
    let (user, identity) = signed_in(auth)?;
    if let Err(e) = auth.sign_in(identity.email(), password) {
        warn!("account deletion refused for {}: {:#}", identity.email(), e);
        return Err(Error::IncorrectPassword);
    }

    DescriptorStore::new(kv.clone()).remove(&identity)?;
    ProfileStore::new(kv).remove(&identity)?;
    auth.sign_out().map_err(Error::auth)?;
    info!("account {} deleted", user.id);
    Ok(NextStep::Login)
}
