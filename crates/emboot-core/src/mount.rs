//! Durable storage mount
//!
//! Attaches the browser's persistent store (IndexedDB, via Emscripten's
//! IDBFS) at [`MOUNT_PATH`](crate::constants::MOUNT_PATH) before the guest
//! starts. Some bootstrap paths run the pre-run hook more than once, so
//! mounting is idempotent.

use emboot_hal::{BootHal, HalError};
use thiserror::Error;

/// Mount errors
#[derive(Debug, Error)]
pub enum MountError {
    #[error("mount path `{0}` is not absolute")]
    InvalidPath(String),
    #[error("cannot create mount directory `{path}`: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: HalError,
    },
    #[error("cannot attach durable store at `{path}`: {source}")]
    Attach {
        path: String,
        #[source]
        source: HalError,
    },
    /// The session is already mounted at a different path
    #[error("already mounted at `{existing}`, refusing to mount `{requested}`")]
    AlreadyMounted { existing: String, requested: String },
}

/// Kind of backing store behind a mount
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackingStore {
    /// Browser IndexedDB: durable, asynchronous, transactional
    IndexedDb,
}

/// Describes the single durable mount of a session.
///
/// Only [`StorageMount::ensure_mounted`] can produce one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MountDescriptor {
    path: String,
    backing: BackingStore,
}

impl MountDescriptor {
    fn attached(path: &str) -> Self {
        Self {
            path: path.to_string(),
            backing: BackingStore::IndexedDb,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn backing(&self) -> BackingStore {
        self.backing
    }
}

/// Mount state of a session (mounted at most once, never unmounted)
#[derive(Debug, Default)]
pub struct StorageMount {
    descriptor: Option<MountDescriptor>,
}

impl StorageMount {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn descriptor(&self) -> Option<&MountDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn is_mounted(&self) -> bool {
        self.descriptor.is_some()
    }

    /// Create the mount directory and attach the durable store.
    ///
    /// Calling this again for the same path is a no-op. An existing directory
    /// or an existing mount at `path` (left by an earlier bootstrap step) is
    /// accepted.
    pub fn ensure_mounted<H: BootHal>(&mut self, hal: &H, path: &str) -> Result<MountDescriptor, MountError> {
        if let Some(existing) = &self.descriptor {
            if existing.path != path {
                return Err(MountError::AlreadyMounted {
                    existing: existing.path.clone(),
                    requested: path.to_string(),
                });
            }
            log::debug!("[mount] {} already mounted", path);
            return Ok(existing.clone());
        }

        if !path.starts_with('/') {
            return Err(MountError::InvalidPath(path.to_string()));
        }

        match hal.fs_mkdir(path) {
            Ok(()) | Err(HalError::AlreadyExists) => {}
            Err(source) => {
                return Err(MountError::CreateDir {
                    path: path.to_string(),
                    source,
                })
            }
        }

        if hal.fs_is_mountpoint(path) {
            log::info!("[mount] Durable store already attached at {}", path);
        } else {
            hal.fs_mount_persistent(path).map_err(|source| MountError::Attach {
                path: path.to_string(),
                source,
            })?;
            log::info!("[mount] Attached durable store at {}", path);
        }

        let descriptor = MountDescriptor::attached(path);
        self.descriptor = Some(descriptor.clone());
        Ok(descriptor)
    }
}
