// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::PathBuf;

/// Error kinds the migration engine distinguishes. Anything that does not
/// need to be matched on is carried as `anyhow::Error` by the callers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The repository lock is held by another process.
    #[error("repository at {} is in use by another process", .0.display())]
    RepoInUse(PathBuf),
    /// The version file does not contain the version a step expects.
    #[error("repository version is {actual}, expected {expected}")]
    VersionMismatch { expected: u32, actual: u32 },
    /// A datastore key is absent.
    #[error("key not found: {0}")]
    NotFound(String),
    /// An on-disk entry could not be decoded as expected.
    #[error("corrupt entry: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The interactive prompt was declined.
    #[error("aborted by user")]
    UserAbort,
}
