//! Local identity persistence.
//!
//! One JSON record under a fixed key. Read and write failures are logged
//! and degrade to "no local identity"; nothing here returns an error.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::LocalIdentity;

/// Key-value persistence for the single local identity record.
pub trait LocalIdentityStore: Send + Sync {
    /// The stored identity, or `None` when absent or unreadable.
    fn load(&self) -> Option<LocalIdentity>;
    /// Overwrite the stored identity. Failures are logged.
    fn save(&self, identity: &LocalIdentity);
    /// Remove the stored identity. Failures are logged.
    fn clear(&self);
}

/// Stores the identity as a JSON file.
#[derive(Debug, Clone)]
pub struct FileIdentityStore {
    path: PathBuf,
}

impl FileIdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, identity: &LocalIdentity) -> std::io::Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let contents = serde_json::to_vec_pretty(identity)?;
        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, contents)?;
        std::fs::rename(&temp_path, &self.path)
    }
}

impl LocalIdentityStore for FileIdentityStore {
    fn load(&self) -> Option<LocalIdentity> {
        let contents = match std::fs::read(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = ?self.path, error = %e, "Failed to read local identity");
                return None;
            }
        };
        match serde_json::from_slice(&contents) {
            Ok(identity) => Some(identity),
            Err(e) => {
                tracing::warn!(path = ?self.path, error = %e, "Ignoring unreadable local identity");
                None
            }
        }
    }

    fn save(&self, identity: &LocalIdentity) {
        match self.write(identity) {
            Ok(()) => tracing::debug!(user_id = %identity.user_id, "Saved local identity"),
            Err(e) => {
                tracing::warn!(path = ?self.path, error = %e, "Failed to save local identity")
            }
        }
    }

    fn clear(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("Cleared local identity"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = ?self.path, error = %e, "Failed to clear local identity")
            }
        }
    }
}

/// Keeps the identity in memory only.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    slot: Mutex<Option<LocalIdentity>>,
}

impl MemoryIdentityStore {
    pub fn with_identity(identity: LocalIdentity) -> Self {
        Self {
            slot: Mutex::new(Some(identity)),
        }
    }
}

impl LocalIdentityStore for MemoryIdentityStore {
    fn load(&self) -> Option<LocalIdentity> {
        self.slot.lock().clone()
    }

    fn save(&self, identity: &LocalIdentity) {
        *self.slot.lock() = Some(identity.clone());
    }

    fn clear(&self) {
        *self.slot.lock() = None;
    }
}
