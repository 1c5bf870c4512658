// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! 0-to-1: introduces the version file. Repositories without one predate
//! versioning entirely and read as version 0.

use tracing::info;

use super::{MigrationStep, Options};
use crate::repo::{check_version, write_version, RepoLock, VERSION_FILE};

pub(super) struct Migration0_1;

impl MigrationStep for Migration0_1 {
    fn versions(&self) -> &str {
        "0-to-1"
    }

    fn reversible(&self) -> bool {
        true
    }

    fn apply(&self, opts: &Options) -> anyhow::Result<()> {
        let _lock = RepoLock::lock(&opts.repo)?;
        check_version(&opts.repo, 0)?;
        write_version(&opts.repo, 1)?;
        info!("repository migrated to version 1");
        Ok(())
    }

    fn revert(&self, opts: &Options) -> anyhow::Result<()> {
        let _lock = RepoLock::lock(&opts.repo)?;
        check_version(&opts.repo, 1)?;
        // a version-0 repo has no version file at all
        std::fs::remove_file(opts.repo.join(VERSION_FILE))?;
        info!("repository reverted to version 0");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::read_version;

    #[test]
    fn apply_then_revert_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let opts = Options::new(dir.path());

        Migration0_1.apply(&opts).unwrap();
        assert_eq!(read_version(dir.path()).unwrap(), 1);

        // second apply refuses: version already bumped
        assert!(Migration0_1.apply(&opts).is_err());

        Migration0_1.revert(&opts).unwrap();
        assert!(!dir.path().join(VERSION_FILE).exists());
        assert_eq!(read_version(dir.path()).unwrap(), 0);
    }
}
