use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::auth::User;
use crate::error::{Error, Result};

/// Signed preview links stay valid for an hour.
pub const PREVIEW_URL_TTL_SECS: u64 = 3600;
/// Download links are short lived.
pub const DOWNLOAD_URL_TTL_SECS: u64 = 60;

/// Metadata row for an uploaded document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub user_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub file_type: String,
    pub storage_path: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFile {
    pub user_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub file_type: String,
    pub storage_path: String,
}

/// Object storage bucket holding document bytes.
pub trait BlobStore {
    fn upload(&self, path: &str, data: &[u8], content_type: &str) -> anyhow::Result<()>;

    /// Signed URL for `path`. May be relative to the storage API root.
    fn create_signed_url(&self, path: &str, expires_in_secs: u64) -> anyhow::Result<String>;

    fn remove(&self, paths: &[&str]) -> anyhow::Result<()>;
}

/// Table of [`FileRecord`]s.
pub trait FileTable {
    fn insert(&self, file: NewFile) -> anyhow::Result<FileRecord>;

    fn list_for_user(&self, user_id: &str) -> anyhow::Result<Vec<FileRecord>>;

    fn delete(&self, id: &str) -> anyhow::Result<()>;
}

pub struct Documents<B, T> {
    blobs: B,
    table: T,
    storage_base_url: String,
}

impl<B: BlobStore, T: FileTable> Documents<B, T> {
    pub fn new(blobs: B, table: T, storage_base_url: impl Into<String>) -> Self {
        Self {
            blobs,
            table,
            storage_base_url: storage_base_url.into(),
        }
    }

    /// Upload the bytes, then record them. A failure in either step is returned as is.
    pub fn upload(
        &self,
        user: &User,
        file_name: &str,
        file_type: &str,
        data: &[u8],
    ) -> Result<FileRecord> {
        self.upload_at(user, file_name, file_type, data, Utc::now())
    }

    pub fn upload_at(
        &self,
        user: &User,
        file_name: &str,
        file_type: &str,
        data: &[u8],
        now: DateTime<Utc>,
    ) -> Result<FileRecord> {
        if file_name.trim().is_empty() {
            return Err(Error::Validation("file name is required".into()));
        }
        let path = storage_path(&user.id, file_name, now.timestamp_millis());
        self.blobs
            .upload(&path, data, file_type)
            .map_err(Error::storage)?;
        let record = self
            .table
            .insert(NewFile {
                user_id: user.id.clone(),
                file_name: file_name.to_string(),
                file_size: data.len() as u64,
                file_type: file_type.to_string(),
                storage_path: path,
            })
            .map_err(Error::storage)?;
        info!(
            "uploaded {} ({}) to {}",
            record.file_name,
            format_file_size(record.file_size),
            record.storage_path
        );
        Ok(record)
    }

    /// Newest first.
    pub fn list(&self, user: &User) -> Result<Vec<FileRecord>> {
        let mut files = self
            .table
            .list_for_user(&user.id)
            .map_err(Error::storage)?;
        files.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(files)
    }

    pub fn preview_url(&self, file: &FileRecord) -> Result<String> {
        self.signed_url(file, PREVIEW_URL_TTL_SECS)
    }

    pub fn download_url(&self, file: &FileRecord) -> Result<String> {
        self.signed_url(file, DOWNLOAD_URL_TTL_SECS)
    }

    /// Remove the stored bytes, then the row.
    pub fn delete(&self, file: &FileRecord) -> Result<()> {
        self.blobs
            .remove(&[file.storage_path.as_str()])
            .map_err(Error::storage)?;
        self.table.delete(&file.id).map_err(Error::storage)?;
        info!("deleted {} ({})", file.file_name, file.storage_path);
        Ok(())
    }

    fn signed_url(&self, file: &FileRecord, ttl: u64) -> Result<String> {
        let url = self
            .blobs
            .create_signed_url(&file.storage_path, ttl)
            .map_err(Error::storage)?;
        debug!("signed url for {} valid {}s", file.storage_path, ttl);
        Ok(absolute_url(&self.storage_base_url, &url))
    }
}

/// `<user_id>/<millis>.<ext>`, extension taken from the original name.
pub fn storage_path(user_id: &str, file_name: &str, millis: i64) -> String {
    match file_name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => format!("{}/{}.{}", user_id, millis, ext),
        _ => format!("{}/{}", user_id, millis),
    }
}

/// Relative signed URLs hang off `<base>/storage/v1`.
pub fn absolute_url(storage_base_url: &str, signed: &str) -> String {
    if signed.starts_with("http") {
        return signed.to_string();
    }
    format!(
        "{}/storage/v1{}",
        storage_base_url.trim_end_matches('/'),
        signed
    )
}

pub fn is_previewable(file_type: &str) -> bool {
    file_type.starts_with("image/") || file_type == "application/pdf"
}

/// Human readable size in 1024 steps, at most two decimals, up to GB.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut unit = 0;
    let mut value = bytes as f64;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let mut text = format!("{:.2}", value);
    if text.contains('.') {
        let trimmed = text.trim_end_matches('0').trim_end_matches('.').len();
        text.truncate(trimmed);
    }
    format!("{} {}", text, UNITS[unit])
}
