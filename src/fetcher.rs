// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Migration steps that live outside this binary.
//!
//! The registry compiles every known step in, but deployments sometimes ship
//! a step as a standalone binary, e.g. when it drags in dependencies this
//! tool should not carry. [`MigrationFetcher`] abstracts where such binaries
//! come from; [`ExternalStep`] adapts one to the [`MigrationStep`] contract
//! through the conventional `apply|revert --repo <path>` interface.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Context as _;
use tracing::info;

use crate::migration::{MigrationStep, Options};

/// Source of per-step migration binaries.
pub trait MigrationFetcher {
    /// Returns the path of a binary implementing the `from`-to-`to` step.
    fn fetch(&self, from: u32, to: u32) -> anyhow::Result<PathBuf>;
}

/// A migration step backed by an external binary.
pub struct ExternalStep {
    binary: PathBuf,
    label: String,
    reversible: bool,
}

impl ExternalStep {
    pub fn new(binary: impl Into<PathBuf>, from: u32, to: u32, reversible: bool) -> Self {
        Self {
            binary: binary.into(),
            label: format!("{from}-to-{to}"),
            reversible,
        }
    }

    pub fn from_fetcher(
        fetcher: &dyn MigrationFetcher,
        from: u32,
        to: u32,
        reversible: bool,
    ) -> anyhow::Result<Self> {
        Ok(Self::new(fetcher.fetch(from, to)?, from, to, reversible))
    }

    fn invoke(&self, subcommand: &str, repo: &Path) -> anyhow::Result<()> {
        info!(
            "running {} {subcommand} for step {}",
            self.binary.display(),
            self.label
        );
        let status = Command::new(&self.binary)
            .arg(subcommand)
            .arg("--repo")
            .arg(repo)
            .status()
            .with_context(|| format!("spawning {}", self.binary.display()))?;
        if !status.success() {
            anyhow::bail!("{} {subcommand} exited with {status}", self.binary.display());
        }
        Ok(())
    }
}

impl MigrationStep for ExternalStep {
    fn versions(&self) -> &str {
        &self.label
    }

    fn reversible(&self) -> bool {
        self.reversible
    }

    fn apply(&self, opts: &Options) -> anyhow::Result<()> {
        self.invoke("apply", &opts.repo)
    }

    fn revert(&self, opts: &Options) -> anyhow::Result<()> {
        if !self.reversible {
            anyhow::bail!("migration {} is not reversible", self.label);
        }
        self.invoke("revert", &opts.repo)
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;

    #[test]
    fn successful_exit_is_ok() {
        let step = ExternalStep::new("/bin/true", 13, 14, true);
        assert_eq!(step.versions(), "13-to-14");
        step.apply(&Options::new("/tmp")).unwrap();
        step.revert(&Options::new("/tmp")).unwrap();
    }

    #[test]
    fn failing_exit_is_an_error() {
        let step = ExternalStep::new("/bin/false", 13, 14, true);
        let err = step.apply(&Options::new("/tmp")).unwrap_err();
        assert!(err.to_string().contains("exited with"));
    }

    #[test]
    fn missing_binary_is_a_spawn_error() {
        let step = ExternalStep::new("/nonexistent/migration-binary", 13, 14, true);
        let err = step.apply(&Options::new("/tmp")).unwrap_err();
        assert!(err.to_string().contains("spawning"));
    }

    #[test]
    fn irreversible_step_refuses_revert() {
        let step = ExternalStep::new("/bin/true", 13, 14, false);
        let err = step.revert(&Options::new("/tmp")).unwrap_err();
        assert!(err.to_string().contains("not reversible"));
    }
}
