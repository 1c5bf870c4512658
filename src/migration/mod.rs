// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The migration framework: the per-step contract, the registry of known
//! steps and the shared harness the config-rewrite steps run on.

pub mod registry;
pub mod revert_phase;

mod v0_1;
mod v1_2;
mod v2_3;
mod v3_4;
mod v4_5;
mod v5_6;
mod v6_7;
mod v7_8;
mod v8_9;
mod v9_10;
pub(crate) mod v10_11;
mod v11_12;
mod v12_13;

use std::path::PathBuf;

use serde_json::Value;
use tracing::info;

use crate::config;
use crate::repo::{check_version, write_version, RepoLock, CONFIG_FILE};

/// Options threaded through every step invocation. Process-wide knobs live
/// here rather than in module state.
#[derive(Debug, Clone)]
pub struct Options {
    /// Repository root.
    pub repo: PathBuf,
    /// Skip interactive confirmation.
    pub yes: bool,
    /// Operator explicitly allowed a downgrade chain.
    pub revert_ok: bool,
}

impl Options {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self {
            repo: repo.into(),
            yes: false,
            revert_ok: false,
        }
    }
}

/// The contract every migration implements.
///
/// `apply` must acquire the repo lock, verify the source version, do its
/// work, sync, and write the target version as its final durable act.
/// `revert` is the inverse and is only invoked when `reversible` is true.
pub trait MigrationStep: Send + Sync {
    /// Label of the step, e.g. `10-to-11`.
    fn versions(&self) -> &str;

    fn reversible(&self) -> bool;

    fn apply(&self, opts: &Options) -> anyhow::Result<()>;

    fn revert(&self, _opts: &Options) -> anyhow::Result<()> {
        anyhow::bail!("migration {} is not reversible", self.versions())
    }
}

impl std::fmt::Debug for dyn MigrationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationStep")
            .field("versions", &self.versions())
            .finish()
    }
}

/// Backup suffix for a config step, e.g. `.3-to-4.bak`.
pub(crate) fn backup_suffix(from: u32, to: u32) -> String {
    format!(".{from}-to-{to}.bak")
}

/// Shared forward harness for the config-rewrite steps: lock, check version,
/// load, backup, transform, save, bump.
pub(crate) fn apply_config_step(
    opts: &Options,
    from: u32,
    to: u32,
    transform: impl FnOnce(&mut Value) -> anyhow::Result<()>,
) -> anyhow::Result<()> {
    let _lock = RepoLock::lock(&opts.repo)?;
    apply_config_step_locked(opts, from, to, transform)
}

/// The harness body, for steps that must do extra work under the repo lock
/// before the rewrite. The caller holds the lock.
pub(crate) fn apply_config_step_locked(
    opts: &Options,
    from: u32,
    to: u32,
    transform: impl FnOnce(&mut Value) -> anyhow::Result<()>,
) -> anyhow::Result<()> {
    check_version(&opts.repo, from)?;

    let path = opts.repo.join(CONFIG_FILE);
    let mut tree = config::load_tree(&path)?;
    transform(&mut tree)?;
    config::backup_then_save(&path, &tree, &backup_suffix(from, to))?;

    write_version(&opts.repo, to)?;
    info!("repository migrated to version {to}");
    Ok(())
}

/// Shared reverse harness: lock, check version, restore the byte-identical
/// backup, bump down.
pub(crate) fn revert_config_step(opts: &Options, from: u32, to: u32) -> anyhow::Result<()> {
    let _lock = RepoLock::lock(&opts.repo)?;
    check_version(&opts.repo, to)?;

    let path = opts.repo.join(CONFIG_FILE);
    config::restore_backup(&path, &backup_suffix(from, to))?;

    write_version(&opts.repo, from)?;
    info!("repository reverted to version {from}");
    Ok(())
}
