// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Command-line surface and the migration driver.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use crate::error::Error;
use crate::migration::{registry, Options};
use crate::repo::read_version;

/// Migrates an on-disk repository between layout versions.
#[derive(Debug, Parser)]
#[command(name = "repo-migrations", about, disable_version_flag = true)]
pub struct Cli {
    /// Repository root
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,
    /// Target version, defaults to the highest this binary supports
    #[arg(long)]
    pub to: Option<u32>,
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
    /// Allow migrating to a lower version
    #[arg(long)]
    pub revert_ok: bool,
    /// Print the highest supported repository version and exit
    #[arg(short = 'v')]
    pub print_version: bool,
}

/// Entry point shared by the binary and the tests.
pub fn main(args: impl IntoIterator<Item = String>) -> anyhow::Result<()> {
    let cli = Cli::parse_from(args);
    run(&cli)
}

pub fn run(cli: &Cli) -> anyhow::Result<()> {
    if cli.print_version {
        println!("{}", registry::latest_version());
        return Ok(());
    }

    let from = read_version(&cli.repo)?;
    let to = cli.to.unwrap_or_else(registry::latest_version);
    info!(
        "repository at {} is at version {from}, target is {to}",
        cli.repo.display()
    );
    if from == to {
        info!("nothing to do");
        return Ok(());
    }

    if !cli.yes && !prompt_confirm(from, to) {
        return Err(Error::UserAbort.into());
    }

    let opts = Options {
        repo: cli.repo.clone(),
        yes: cli.yes,
        revert_ok: cli.revert_ok,
    };
    registry::run(&opts, from, to)?;
    info!("repository is now at version {}", read_version(&cli.repo)?);
    Ok(())
}

/// Require user confirmation. Returns `true` without asking when stdin is
/// not a terminal, so scripted runs proceed.
fn prompt_confirm(from: u32, to: u32) -> bool {
    use std::io::IsTerminal as _;

    if !std::io::stdin().is_terminal() {
        return true;
    }
    let verb = if to < from { "revert" } else { "migrate" };
    dialoguer::Confirm::new()
        .with_prompt(format!("{verb} repository from version {from} to {to}?"))
        .default(false)
        .interact_on(&dialoguer::console::Term::stderr())
        .unwrap_or(false)
}
