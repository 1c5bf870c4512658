// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! 4-to-5: canonicalises the casing of the `Datastore` section. Legacy
//! writers emitted `datastore`; reads stay case-insensitive either way, this
//! step just settles what is written. The revert is multi-phase like 3-to-4.

use tracing::info;

use super::revert_phase::RevertPhase;
use super::{backup_suffix, MigrationStep, Options};
use crate::config;
use crate::repo::{check_version, write_version, RepoLock, CONFIG_FILE};

pub(super) struct Migration4_5;

impl MigrationStep for Migration4_5 {
    fn versions(&self) -> &str {
        "4-to-5"
    }

    fn reversible(&self) -> bool {
        true
    }

    fn apply(&self, opts: &Options) -> anyhow::Result<()> {
        let _lock = RepoLock::lock(&opts.repo)?;
        RevertPhase::clear(&opts.repo)?;
        super::apply_config_step_locked(opts, 4, 5, |tree| {
            config::canonicalize_section(tree, "Datastore");
            Ok(())
        })
    }

    fn revert(&self, opts: &Options) -> anyhow::Result<()> {
        let _lock = RepoLock::lock(&opts.repo)?;
        check_version(&opts.repo, 5)?;

        let mut phase = RevertPhase::load(&opts.repo)?;
        if phase.should_run(0) {
            config::restore_backup(&opts.repo.join(CONFIG_FILE), &backup_suffix(4, 5))?;
            phase.complete(0)?;
        }
        if phase.should_run(1) {
            write_version(&opts.repo, 4)?;
            phase.complete(1)?;
        }
        phase.finish()?;
        info!("repository reverted to version 4");
        Ok(())
    }
}
