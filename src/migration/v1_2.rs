// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! 1-to-2: retires the legacy `daemon.lock` file. From version 2 on, the
//! engine and the node both lock `repo.lock`; the old file is removed only
//! after the step has otherwise succeeded.

use tracing::info;

use super::{MigrationStep, Options};
use crate::repo::lock::LEGACY_LOCK_FILE;
use crate::repo::{check_version, write_version, RepoLock};

pub(super) struct Migration1_2;

impl MigrationStep for Migration1_2 {
    fn versions(&self) -> &str {
        "1-to-2"
    }

    fn reversible(&self) -> bool {
        true
    }

    fn apply(&self, opts: &Options) -> anyhow::Result<()> {
        let _lock = RepoLock::lock(&opts.repo)?;
        check_version(&opts.repo, 1)?;

        let legacy = opts.repo.join(LEGACY_LOCK_FILE);
        if legacy.exists() {
            std::fs::remove_file(&legacy)?;
            info!("removed legacy lock file {}", legacy.display());
        }

        write_version(&opts.repo, 2)?;
        info!("repository migrated to version 2");
        Ok(())
    }

    fn revert(&self, opts: &Options) -> anyhow::Result<()> {
        let _lock = RepoLock::lock(&opts.repo)?;
        check_version(&opts.repo, 2)?;

        // the legacy lock file was always empty; recreate it as such
        std::fs::File::create(opts.repo.join(LEGACY_LOCK_FILE))?;

        write_version(&opts.repo, 1)?;
        info!("repository reverted to version 1");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::{read_version, write_version};

    #[test]
    fn removes_and_restores_legacy_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        write_version(dir.path(), 1).unwrap();
        std::fs::write(dir.path().join(LEGACY_LOCK_FILE), b"").unwrap();

        let opts = Options::new(dir.path());
        Migration1_2.apply(&opts).unwrap();
        assert!(!dir.path().join(LEGACY_LOCK_FILE).exists());
        assert_eq!(read_version(dir.path()).unwrap(), 2);

        Migration1_2.revert(&opts).unwrap();
        assert!(dir.path().join(LEGACY_LOCK_FILE).exists());
        assert_eq!(read_version(dir.path()).unwrap(), 1);
    }

    #[test]
    fn apply_without_legacy_file_still_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        write_version(dir.path(), 1).unwrap();

        Migration1_2.apply(&Options::new(dir.path())).unwrap();
        assert_eq!(read_version(dir.path()).unwrap(), 2);
    }
}
