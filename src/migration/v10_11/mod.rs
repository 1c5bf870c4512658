// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! 10-to-11: block keys stop spelling the full CID and spell the raw
//! multihash instead, so the same content stored under CIDv0 and CIDv1 names
//! collapses into one block.
//!
//! The forward pass runs in two phases. A dry run first streams every block
//! key and appends the CIDv1 ones to an on-disk backup log, which is made
//! durable before anything moves. The swap phase then replays that log
//! through a pool of workers; because each swap is idempotent and the log
//! survives crashes, an interrupted run can simply be started again. The
//! revert replays the log backwards without deleting the multihash keys, and
//! additionally re-creates the CIDv1 spelling of everything still pinned, so
//! content pinned after the upgrade resolves on the downgraded node too.

mod swap;

use std::fs::{File, OpenOptions};
use std::io::{BufRead as _, BufReader, BufWriter, Write as _};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use anyhow::{bail, Context as _};
use cid::Version;
use human_repr::HumanCount as _;
use itertools::Itertools as _;
use tracing::{debug, info, warn};

use self::swap::{Swap, SwapStats, SwapWorker};
use super::{MigrationStep, Options};
use crate::config;
use crate::datastore::{
    flatfs::is_basic_flatfs_spec, key, open_repo_datastore, Datastore, DsKey, Flatfs,
};
use crate::pin::{PinLookup as _, StoredPins};
use crate::repo::{check_version, write_version, RepoLock, CONFIG_FILE};

/// On-disk list of every moved key, one per line. It stays behind after the
/// migration; the revert consumes it and renames it out of the way.
pub(crate) const BACKUP_LOG: &str = "11-to-12-cids.txt";
const REVERTED_SUFFIX: &str = ".reverted";

const ENV_WORKERS: &str = "REPO_MIGRATION_10_TO_11_NWORKERS";
const ENV_SYNC_SIZE: &str = "REPO_MIGRATION_10_TO_11_SYNC_SIZE_BYTES";
const ENV_FLATFS_FASTPATH: &str = "REPO_MIGRATION_10_TO_11_ENABLE_FLATFS_FASTPATH";

const CHANNEL_CAPACITY: usize = 1000;

pub(super) struct Migration10_11;

impl MigrationStep for Migration10_11 {
    fn versions(&self) -> &str {
        "10-to-11"
    }

    fn reversible(&self) -> bool {
        true
    }

    fn apply(&self, opts: &Options) -> anyhow::Result<()> {
        run_forward(&opts.repo, &RewriteOptions::from_env())
    }

    fn revert(&self, opts: &Options) -> anyhow::Result<()> {
        run_reverse(&opts.repo, &RewriteOptions::from_env())
    }
}

/// Tuning knobs, taken from the process environment so operators can adjust
/// a long-running migration without new command-line surface.
#[derive(Debug, Clone)]
pub(crate) struct RewriteOptions {
    pub workers: usize,
    /// Bytes written between durability barriers, per worker.
    pub sync_size: u64,
    pub flatfs_fastpath: bool,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            sync_size: 100 * (1 << 20),
            flatfs_fastpath: true,
        }
    }
}

impl RewriteOptions {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            workers: env_number(ENV_WORKERS, defaults.workers, 1),
            sync_size: env_number(ENV_SYNC_SIZE, defaults.sync_size, 1),
            flatfs_fastpath: env_flag(ENV_FLATFS_FASTPATH, defaults.flatfs_fastpath),
        }
    }
}

fn env_number<T>(name: &str, default: T, min: T) -> T
where
    T: std::str::FromStr + Ord + Copy + std::fmt::Display,
{
    let Ok(raw) = std::env::var(name) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => value.max(min),
        Err(_) => {
            warn!("{name}={raw:?} is not a number, using {default}");
            default
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    let Ok(raw) = std::env::var(name) else {
        return default;
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            warn!("{name}={raw:?} is not a boolean, using {default}");
            default
        }
    }
}

pub(crate) fn run_forward(repo: &Path, ropts: &RewriteOptions) -> anyhow::Result<()> {
    let _lock = RepoLock::lock(repo)?;
    check_version(repo, 10)?;
    let (mount, blocks) = open_repo_datastore(repo)?;

    let log_path = repo.join(BACKUP_LOG);
    if log_path.exists() {
        info!(
            "existing backup log at {}, resuming an interrupted migration",
            log_path.display()
        );
    }
    let planned = plan_swaps(&mount, &log_path)?;
    info!("{planned} CIDv1 keys to move");

    let fastpath = ropts.flatfs_fastpath && repo_has_basic_flatfs(repo);
    if fastpath {
        info!("block store is plain flatfs, moving blocks by rename");
    }

    let swaps = log_swaps(&log_path, false)?;
    let stats = run_swaps(&mount, fastpath.then_some(blocks.as_ref()), swaps, ropts)?;
    report(&stats)?;

    write_version(repo, 11)?;
    info!(
        "repository migrated to version 11, backup log kept at {}",
        log_path.display()
    );
    Ok(())
}

pub(crate) fn run_reverse(repo: &Path, ropts: &RewriteOptions) -> anyhow::Result<()> {
    let _lock = RepoLock::lock(repo)?;
    check_version(repo, 11)?;
    let (mount, _blocks) = open_repo_datastore(repo)?;

    let log_path = repo.join(BACKUP_LOG);
    let logged = if log_path.exists() {
        info!(
            "restoring CIDv1 keys from {} and the pin set",
            log_path.display()
        );
        Some(log_swaps(&log_path, true)?)
    } else {
        warn!(
            "no backup log at {}, restoring from the pin set only",
            log_path.display()
        );
        None
    };

    // content pinned after the upgrade never made it into the log, but the
    // downgraded node will still look it up by CID. A pin that is also in the
    // log gets swapped twice, which is harmless: both swaps keep the
    // multihash key and re-put the same value. The log itself is streamed
    // straight into the channel, never held in memory.
    let blocks_prefix = DsKey::new("/blocks");
    let pins = StoredPins::new(&mount);
    let mut pinned = pins.pinned_cids()?;
    pinned.extend(pins.files_root()?);
    let pin_swaps = pinned
        .into_iter()
        .filter(|cid| cid.version() == Version::V1)
        .unique()
        .map(move |cid| -> anyhow::Result<Option<Swap>> {
            Ok(Some(Swap {
                old: key::multihash_key(&blocks_prefix, &cid),
                new: key::cid_key(&blocks_prefix, &cid),
                keep_old: true,
            }))
        });

    let swaps = logged.into_iter().flatten().chain(pin_swaps);
    let stats = run_swaps(&mount, None, swaps, ropts)?;
    report(&stats)?;

    write_version(repo, 10)?;
    if log_path.exists() {
        let mut reverted = log_path.as_os_str().to_owned();
        reverted.push(REVERTED_SUFFIX);
        std::fs::rename(&log_path, PathBuf::from(reverted))?;
    }
    info!("repository reverted to version 10");
    Ok(())
}

/// Dry run: append the key of every CIDv1-addressed block to the backup log
/// and make the log durable. CIDv0 keys already spell their multihash; keys
/// that decode to no CID at all are left alone.
fn plan_swaps(ds: &dyn Datastore, log_path: &Path) -> anyhow::Result<u64> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("opening backup log {}", log_path.display()))?;
    let mut log = BufWriter::new(file);

    let mut planned = 0u64;
    for prefix in [DsKey::new("/blocks"), DsKey::new("/filestore")] {
        for entry in ds.query(&prefix, true)? {
            let entry = entry?;
            match key::parse_cid_name(entry.key.base_name()) {
                Ok(cid) if cid.version() == Version::V1 => {
                    writeln!(log, "{}", entry.key)?;
                    planned += 1;
                }
                Ok(_) => {}
                Err(e) => debug!("leaving non-CID key {} alone: {e}", entry.key),
            }
        }
    }
    log.flush()?;
    log.get_ref().sync_all()?;
    Ok(planned)
}

/// Streams the backup log as swaps. Corrupt lines are logged and skipped so
/// one bad record never blocks a whole pass.
fn log_swaps(
    path: &Path,
    reverse: bool,
) -> anyhow::Result<impl Iterator<Item = anyhow::Result<Option<Swap>>>> {
    let file =
        File::open(path).with_context(|| format!("opening backup log {}", path.display()))?;
    Ok(BufReader::new(file).lines().map(move |line| {
        let line = line.context("reading backup log")?;
        Ok(line_to_swap(line.trim(), reverse))
    }))
}

fn line_to_swap(line: &str, reverse: bool) -> Option<Swap> {
    if line.is_empty() {
        return None;
    }
    let cid_shaped = DsKey::new(line);
    let cid = match key::parse_cid_name(cid_shaped.base_name()) {
        Ok(cid) => cid,
        Err(e) => {
            warn!("backup log line {line:?} skipped: {e}");
            return None;
        }
    };
    let mh_shaped = key::multihash_key(&cid_shaped.parent(), &cid);
    Some(if reverse {
        Swap {
            old: mh_shaped,
            new: cid_shaped,
            keep_old: true,
        }
    } else {
        Swap {
            old: cid_shaped,
            new: mh_shaped,
            keep_old: false,
        }
    })
}

/// The rename shortcut is only sound when the configured block store really
/// is the flatfs layout this engine assumes.
fn repo_has_basic_flatfs(repo: &Path) -> bool {
    let mut tree = match config::load_tree(&repo.join(CONFIG_FILE)) {
        Ok(tree) => tree,
        Err(e) => {
            warn!("cannot read config, disabling the flatfs fast path: {e:#}");
            return false;
        }
    };
    config::section_mut(&mut tree, "Datastore")
        .and_then(|ds| ds.get("Spec"))
        .is_some_and(is_basic_flatfs_spec)
}

/// Fans swaps out to a bounded worker pool and waits for all of them.
fn run_swaps(
    ds: &dyn Datastore,
    layout: Option<&Flatfs>,
    swaps: impl Iterator<Item = anyhow::Result<Option<Swap>>>,
    ropts: &RewriteOptions,
) -> anyhow::Result<SwapStats> {
    let stats = SwapStats::default();
    let (tx, rx) = flume::bounded::<Swap>(CHANNEL_CAPACITY);
    std::thread::scope(|scope| -> anyhow::Result<()> {
        for _ in 0..ropts.workers.max(1) {
            let rx = rx.clone();
            let worker = SwapWorker::new(ds, layout, ropts.sync_size, &stats);
            scope.spawn(move || worker.run(rx));
        }
        drop(rx);
        for swap in swaps {
            let Some(swap) = swap? else { continue };
            if tx.send(swap).is_err() {
                bail!("all swap workers exited early");
            }
        }
        drop(tx);
        Ok(())
    })?;
    Ok(stats)
}

fn report(stats: &SwapStats) -> anyhow::Result<()> {
    let moved = stats.moved.load(Ordering::Relaxed);
    let skipped = stats.skipped.load(Ordering::Relaxed);
    let errors = stats.errors.load(Ordering::Relaxed);
    info!(
        "moved {moved} keys totalling {} ({skipped} already in place)",
        stats.bytes.load(Ordering::Relaxed).human_count_bytes()
    );
    if errors > 0 {
        bail!("{errors} keys failed to move; rerun to retry the failures");
    }
    Ok(())
}
