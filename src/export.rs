use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{require_user, AuthProvider};
use crate::documents::{FileRecord, FileTable};
use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::profile::{ProfileStore, SecuritySettings};
use crate::storage::KeyValueStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportData {
    pub user_profile: ExportedProfile,
    pub files: Vec<ExportedFile>,
    pub security_settings: SecuritySettings,
    pub export_timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedProfile {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub phone: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedFile {
    pub id: String,
    pub file_name: String,
    pub file_size: u64,
    pub file_type: String,
    pub uploaded_at: String,
}

impl From<&FileRecord> for ExportedFile {
    fn from(file: &FileRecord) -> Self {
        Self {
            id: file.id.clone(),
            file_name: file.file_name.clone(),
            file_size: file.file_size,
            file_type: file.file_type.clone(),
            uploaded_at: rfc3339(file.uploaded_at),
        }
    }
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Collect everything the signed-in user can take with them.
pub fn export_user_data<P, T, S>(
    auth: &P,
    files: &T,
    profiles: &ProfileStore<S>,
    now: DateTime<Utc>,
) -> Result<ExportData>
where
    P: AuthProvider + ?Sized,
    T: FileTable + ?Sized,
    S: KeyValueStore,
{
    let user = require_user(auth)?;
    let identity = Identity::from_email(&user.email)?;
    let profile = profiles.profile(&identity)?;

    let mut records = files.list_for_user(&user.id).map_err(Error::storage)?;
    records.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));

    Ok(ExportData {
        user_profile: ExportedProfile {
            id: user.id,
            email: user.email,
            full_name: profile
                .as_ref()
                .map(|p| p.full_name.clone())
                .unwrap_or_default(),
            phone: profile
                .as_ref()
                .map(|p| p.phone.clone())
                .unwrap_or_default(),
            created_at: profile
                .as_ref()
                .map(|p| rfc3339(p.registered_at))
                .unwrap_or_default(),
        },
        files: records.iter().map(ExportedFile::from).collect(),
        security_settings: profiles.settings(&identity)?,
        export_timestamp: rfc3339(now),
    })
}

impl ExportData {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// One `Type,Property,Value` row per exported fact.
    pub fn to_csv(&self) -> String {
        let p = &self.user_profile;
        let s = &self.security_settings;
        let mut rows: Vec<[String; 3]> = vec![
            row("Type", "Property", "Value"),
            row("Profile", "ID", &p.id),
            row("Profile", "Email", &p.email),
            row("Profile", "Full Name", &p.full_name),
            row("Profile", "Phone", &p.phone),
            row("Profile", "Created At", &p.created_at),
            row("Security", "Two Factor Enabled", &s.two_factor_enabled.to_string()),
            row("Security", "Biometric Enabled", &s.biometric_enabled.to_string()),
            row("Security", "Public Profile", &s.public_profile.to_string()),
        ];
        for f in &self.files {
            let mb = f.file_size as f64 / 1024.0 / 1024.0;
            rows.push(row(
                "File",
                &f.file_name,
                &format!("{} ({:.2} MB)", f.file_type, mb),
            ));
        }
        rows.iter()
            .map(|r| r.iter().map(|v| csv_field(v)).collect::<Vec<_>>().join(","))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn row(kind: &str, property: &str, value: &str) -> [String; 3] {
    [kind.to_string(), property.to_string(), value.to_string()]
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
