// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

use fs4::FileExt;
use tracing::debug;

use crate::error::Error;

/// Advisory lock file at the repo root.
pub const LOCK_FILE: &str = "repo.lock";
/// Lock file name used by repositories before version 2. The 1-to-2 step
/// removes it.
pub const LEGACY_LOCK_FILE: &str = "daemon.lock";

/// Exclusive advisory lock on the repository. The lock is tied to the open
/// file description, so it is released on drop and on process exit, including
/// abrupt termination. The lock file itself stays in place.
pub struct RepoLock {
    file: File,
    path: PathBuf,
}

impl RepoLock {
    /// Acquires the lock, failing with [`Error::RepoInUse`] if any other
    /// process (or another handle in this one) holds it.
    pub fn lock(repo: &Path) -> Result<Self, Error> {
        let path = repo.join(LOCK_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!("acquired repo lock at {}", path.display());
                Ok(Self { file, path })
            }
            Err(e) if e.raw_os_error() == fs4::lock_contended_error().raw_os_error() => {
                Err(Error::RepoInUse(repo.to_path_buf()))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            debug!("failed to release repo lock at {}: {e}", self.path.display());
        }
    }
}
