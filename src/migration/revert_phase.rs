// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Durable progress marker for multi-phase reverts.
//!
//! Some reverts consist of sub-steps that are individually destructive (for
//! example, consuming the config backup before the version is bumped down).
//! The `revert-phase` file at the repo root records how many sub-steps have
//! completed, so an interrupted revert resumes after the last completed one
//! instead of re-running it.

use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::utils::io::write_file_atomic;

pub const REVERT_PHASE_FILE: &str = "revert-phase";

pub struct RevertPhase {
    path: PathBuf,
    completed: u32,
}

impl RevertPhase {
    /// Loads the marker; a missing file means no phase has completed.
    pub fn load(repo: &Path) -> Result<Self, Error> {
        let path = repo.join(REVERT_PHASE_FILE);
        let completed = match std::fs::read_to_string(&path) {
            Ok(text) => text.trim().parse().map_err(|_| {
                Error::Corrupt(format!("revert-phase file contains {:?}", text.trim()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(Error::Io(e)),
        };
        Ok(Self { path, completed })
    }

    /// Whether the phase at `index` still has to run.
    pub fn should_run(&self, index: u32) -> bool {
        self.completed <= index
    }

    /// Durably records that the phase at `index` completed.
    pub fn complete(&mut self, index: u32) -> Result<(), Error> {
        self.completed = index + 1;
        write_file_atomic(&self.path, format!("{}\n", self.completed).as_bytes())?;
        Ok(())
    }

    /// Removes the marker once the whole revert has committed.
    pub fn finish(self) -> Result<(), Error> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Clears a stale marker, e.g. before a fresh forward apply.
    pub fn clear(repo: &Path) -> Result<(), Error> {
        match std::fs::remove_file(repo.join(REVERT_PHASE_FILE)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_resume_from_last_completed() {
        let dir = tempfile::tempdir().unwrap();

        let mut phase = RevertPhase::load(dir.path()).unwrap();
        assert!(phase.should_run(0));
        assert!(phase.should_run(1));
        phase.complete(0).unwrap();
        drop(phase); // simulate a crash between phases

        let mut phase = RevertPhase::load(dir.path()).unwrap();
        assert!(!phase.should_run(0));
        assert!(phase.should_run(1));
        phase.complete(1).unwrap();
        phase.finish().unwrap();

        assert!(!dir.path().join(REVERT_PHASE_FILE).exists());
        let fresh = RevertPhase::load(dir.path()).unwrap();
        assert!(fresh.should_run(0));
    }

    #[test]
    fn clear_removes_stale_marker() {
        let dir = tempfile::tempdir().unwrap();
        let mut phase = RevertPhase::load(dir.path()).unwrap();
        phase.complete(0).unwrap();
        drop(phase);

        RevertPhase::clear(dir.path()).unwrap();
        assert!(!dir.path().join(REVERT_PHASE_FILE).exists());
    }
}
