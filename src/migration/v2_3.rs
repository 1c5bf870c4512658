// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! 2-to-3: renames the block-store root from its legacy `flatfs` name to
//! `blocks` and introduces the `SHARDING` specification file. The files
//! themselves are not re-sharded; `next-to-last/2` was already the implicit
//! layout, the spec file merely makes it explicit.

use tracing::info;

use super::{MigrationStep, Options};
use crate::datastore::flatfs::{README_FILE, SHARDING_FILE};
use crate::datastore::ShardFunc;
use crate::repo::{check_version, write_version, RepoLock, BLOCKS_DIR};

const LEGACY_BLOCKS_DIR: &str = "flatfs";

pub(super) struct Migration2_3;

impl MigrationStep for Migration2_3 {
    fn versions(&self) -> &str {
        "2-to-3"
    }

    fn reversible(&self) -> bool {
        true
    }

    fn apply(&self, opts: &Options) -> anyhow::Result<()> {
        let _lock = RepoLock::lock(&opts.repo)?;
        check_version(&opts.repo, 2)?;

        let legacy = opts.repo.join(LEGACY_BLOCKS_DIR);
        let blocks = opts.repo.join(BLOCKS_DIR);
        if legacy.is_dir() {
            std::fs::rename(&legacy, &blocks)?;
            info!("renamed {} to {}", legacy.display(), blocks.display());
        }
        ShardFunc::NextToLast(2).write_to(&blocks)?;

        write_version(&opts.repo, 3)?;
        info!("repository migrated to version 3");
        Ok(())
    }

    fn revert(&self, opts: &Options) -> anyhow::Result<()> {
        let _lock = RepoLock::lock(&opts.repo)?;
        check_version(&opts.repo, 3)?;

        let blocks = opts.repo.join(BLOCKS_DIR);
        std::fs::remove_file(blocks.join(SHARDING_FILE))?;
        std::fs::remove_file(blocks.join(README_FILE))?;
        std::fs::rename(&blocks, opts.repo.join(LEGACY_BLOCKS_DIR))?;

        write_version(&opts.repo, 2)?;
        info!("repository reverted to version 2");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::{read_version, write_version};

    #[test]
    fn renames_and_writes_sharding_spec() {
        let dir = tempfile::tempdir().unwrap();
        write_version(dir.path(), 2).unwrap();
        std::fs::create_dir_all(dir.path().join("flatfs/AA")).unwrap();
        std::fs::write(dir.path().join("flatfs/AA/CIQAAA.data"), b"block").unwrap();

        let opts = Options::new(dir.path());
        Migration2_3.apply(&opts).unwrap();

        assert!(!dir.path().join("flatfs").exists());
        assert!(dir.path().join("blocks/AA/CIQAAA.data").exists());
        assert_eq!(
            ShardFunc::read_from(&dir.path().join("blocks")).unwrap(),
            ShardFunc::NextToLast(2)
        );
        assert_eq!(read_version(dir.path()).unwrap(), 3);

        Migration2_3.revert(&opts).unwrap();
        assert!(dir.path().join("flatfs/AA/CIQAAA.data").exists());
        assert!(!dir.path().join("blocks").exists());
        assert_eq!(read_version(dir.path()).unwrap(), 2);
    }
}
