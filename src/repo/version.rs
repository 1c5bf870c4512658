// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::{io::ErrorKind, path::Path};

use crate::error::Error;
use crate::utils::io::write_file_atomic;

/// Plaintext decimal version file at the repo root.
pub const VERSION_FILE: &str = "version";

/// Reads the repository version. A missing file is version 0; a present but
/// unreadable file is fatal; non-decimal content is [`Error::Corrupt`].
pub fn read_version(repo: &Path) -> Result<u32, Error> {
    let path = repo.join(VERSION_FILE);
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(Error::Io(e)),
    };
    text.trim()
        .parse()
        .map_err(|_| Error::Corrupt(format!("version file contains {:?}", text.trim())))
}

/// Fails with [`Error::VersionMismatch`] unless the repository is at
/// `expected`. Every step calls this before doing any work.
pub fn check_version(repo: &Path, expected: u32) -> Result<(), Error> {
    let actual = read_version(repo)?;
    if actual != expected {
        return Err(Error::VersionMismatch { expected, actual });
    }
    Ok(())
}

/// Atomically writes the version file. This is the commit point of every
/// migration step and must be its final durable act.
pub fn write_version(repo: &Path, version: u32) -> Result<(), Error> {
    write_file_atomic(&repo.join(VERSION_FILE), format!("{version}\n").as_bytes())?;
    Ok(())
}
