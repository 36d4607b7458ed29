use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::storage::KeyValueStore;

/// Locally kept profile written at registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    /// PNG of the enrollment still.
    pub photo_png: Vec<u8>,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecuritySettings {
    pub two_factor_enabled: bool,
    pub biometric_enabled: bool,
    pub public_profile: bool,
}

/// Profiles and security toggles stored next to the descriptors.
#[derive(Debug, Clone)]
pub struct ProfileStore<S> {
    kv: S,
}

impl<S: KeyValueStore> ProfileStore<S> {
    pub fn new(kv: S) -> Self {
        Self { kv }
    }

    pub fn put_profile(&self, identity: &Identity, profile: &Profile) -> Result<()> {
        let data = postcard::to_allocvec(profile)?;
        self.kv
            .put(&identity.profile_key(), &data)
            .map_err(Error::storage)
    }

    pub fn profile(&self, identity: &Identity) -> Result<Option<Profile>> {
        match self.kv.get(&identity.profile_key()).map_err(Error::storage)? {
            Some(data) => Ok(Some(postcard::from_bytes(&data)?)),
            None => Ok(None),
        }
    }

    /// Settings default to all-off when never saved.
    pub fn settings(&self, identity: &Identity) -> Result<SecuritySettings> {
        match self.kv.get(&identity.settings_key()).map_err(Error::storage)? {
            Some(data) => Ok(postcard::from_bytes(&data)?),
            None => Ok(SecuritySettings::default()),
        }
    }

    /// Forget the profile and settings of `identity`.
    pub fn remove(&self, identity: &Identity) -> Result<()> {
        self.kv
            .remove(&identity.profile_key())
            .map_err(Error::storage)?;
        self.kv
            .remove(&identity.settings_key())
            .map_err(Error::storage)
    }

    pub fn put_settings(&self, identity: &Identity, settings: &SecuritySettings) -> Result<()> {
        let data = postcard::to_allocvec(settings)?;
        self.kv
            .put(&identity.settings_key(), &data)
            .map_err(Error::storage)
    }
}
