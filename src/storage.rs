use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Context, Result as AnyResult};
use digid_vision::FaceDescriptor;

use crate::error::{Error, Result};
use crate::identity::Identity;

/// Device-local key-value persistence. Single writer, last write wins.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> AnyResult<Option<Vec<u8>>>;
    fn put(&self, key: &str, value: &[u8]) -> AnyResult<()>;
    fn remove(&self, key: &str) -> AnyResult<()>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for &S {
    fn get(&self, key: &str) -> AnyResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &[u8]) -> AnyResult<()> {
        (**self).put(key, value)
    }

    fn remove(&self, key: &str) -> AnyResult<()> {
        (**self).remove(key)
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    fn get(&self, key: &str) -> AnyResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &[u8]) -> AnyResult<()> {
        (**self).put(key, value)
    }

    fn remove(&self, key: &str) -> AnyResult<()> {
        (**self).remove(key)
    }
}

/// One file per key under a root directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        let mut name = String::with_capacity(key.len() + 4);
        for b in key.bytes() {
            if b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_' | b'@') {
                name.push(b as char);
            } else {
                name.push_str(&format!("%{:02X}", b));
            }
        }
        name.push_str(".bin");
        self.root.join(name)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> AnyResult<Option<Vec<u8>>> {
        let file = self.key_path(key);
        if !file.exists() {
            return Ok(None);
        }
        let data = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
        Ok(Some(data))
    }

    fn put(&self, key: &str, value: &[u8]) -> AnyResult<()> {
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("creating {}", self.root.display()))?;
        let file = self.key_path(key);
        // write-then-rename so a reader never sees a half-written value
        let tmp = file.with_extension("tmp");
        std::fs::write(&tmp, value).with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &file).with_context(|| format!("replacing {}", file.display()))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> AnyResult<()> {
        let file = self.key_path(key);
        if file.exists() {
            std::fs::remove_file(&file).with_context(|| format!("removing {}", file.display()))?;
        }
        Ok(())
    }
}

/// In-memory store, lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> AnyResult<usize> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> AnyResult<bool> {
        Ok(self.read()?.is_empty())
    }

    pub fn contains_key(&self, key: &str) -> AnyResult<bool> {
        Ok(self.read()?.contains_key(key))
    }

    fn read(&self) -> AnyResult<RwLockReadGuard<'_, HashMap<String, Vec<u8>>>> {
        self.entries
            .read()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))
    }

    fn write(&self) -> AnyResult<RwLockWriteGuard<'_, HashMap<String, Vec<u8>>>> {
        self.entries
            .write()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> AnyResult<Option<Vec<u8>>> {
        Ok(self.read()?.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> AnyResult<()> {
        self.write()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> AnyResult<()> {
        self.write()?.remove(key);
        Ok(())
    }
}

/// Reference descriptors, one per identity.
#[derive(Debug, Clone)]
pub struct DescriptorStore<S> {
    kv: S,
}

impl<S: KeyValueStore> DescriptorStore<S> {
    pub fn new(kv: S) -> Self {
        Self { kv }
    }

    /// Store `descriptor` as the reference for `identity`, replacing any earlier one.
    pub fn put(&self, identity: &Identity, descriptor: &FaceDescriptor) -> Result<()> {
        let data = postcard::to_allocvec(descriptor)?;
        self.kv
            .put(&identity.descriptor_key(), &data)
            .map_err(Error::storage)?;
        log::info!(
            "stored reference descriptor for {} ({} values)",
            identity.email(),
            descriptor.len()
        );
        Ok(())
    }

    pub fn get(&self, identity: &Identity) -> Result<Option<FaceDescriptor>> {
        let Some(data) = self
            .kv
            .get(&identity.descriptor_key())
            .map_err(Error::storage)?
        else {
            return Ok(None);
        };
        let descriptor = postcard::from_bytes(&data).map_err(|e| {
            Error::Descriptor(format!(
                "stored reference for {} is unreadable: {}",
                identity.email(),
                e
            ))
        })?;
        Ok(Some(descriptor))
    }

    pub fn remove(&self, identity: &Identity) -> Result<()> {
        self.kv
            .remove(&identity.descriptor_key())
            .map_err(Error::storage)
    }

    pub fn contains(&self, identity: &Identity) -> Result<bool> {
        Ok(self
            .kv
            .get(&identity.descriptor_key())
            .map_err(Error::storage)?
            .is_some())
    }
}
