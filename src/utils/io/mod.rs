// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::{
    fs::File,
    io::{self, Write},
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;

/// A file that becomes visible at its target path only on [`AtomicFile::commit`].
///
/// Writes stream into a temp sibling in the target's directory; commit renames
/// the sibling over the target. Dropping without committing removes the temp,
/// leaving any pre-existing target untouched. The file is created with
/// permissions 0600.
pub struct AtomicFile {
    target: PathBuf,
    temp: NamedTempFile,
}

impl AtomicFile {
    pub fn new(target: impl Into<PathBuf>) -> io::Result<Self> {
        let target = target.into();
        let parent = target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let temp = NamedTempFile::new_in(parent)?;
        set_sensitive_permissions(temp.as_file())?;
        Ok(Self { target, temp })
    }

    /// Renames the temp sibling over the target. The rename is the commit
    /// point; an abort after a successful commit is impossible because commit
    /// consumes the file.
    pub fn commit(self) -> io::Result<()> {
        self.temp.as_file().sync_all()?;
        self.temp
            .persist(&self.target)
            .map_err(|e| e.error)
            .map(|_| ())
    }

    /// Removes the temp sibling without touching the target. Dropping the
    /// file has the same effect; this form just makes the intent explicit.
    pub fn abort(self) {
        drop(self);
    }
}

impl Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.temp.as_file().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.temp.as_file().flush()
    }
}

/// Atomically replaces `path` with `contents`, mode 0600.
pub fn write_file_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = AtomicFile::new(path)?;
    file.write_all(contents)?;
    file.commit()
}

fn set_sensitive_permissions(file: &File) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
