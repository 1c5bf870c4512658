// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! A single planned key move and the worker that executes streams of them.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{info, trace, warn};

use crate::datastore::{Datastore, DsKey, Flatfs};
use crate::error::Error;

/// One key move. `keep_old` is set on reverts: the multihash key may still be
/// the address of CIDv0 content, so it must survive the copy back.
#[derive(Debug, Clone)]
pub(super) struct Swap {
    pub old: DsKey,
    pub new: DsKey,
    pub keep_old: bool,
}

/// How far an individual swap got. `Skipped` means the source key was already
/// gone, which a rerun after an interrupted pass routinely sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum SwapState {
    Written,
    OldDeleted,
    Skipped,
}

/// Counters shared by all workers of one pass.
#[derive(Default)]
pub(super) struct SwapStats {
    pub moved: AtomicU64,
    pub skipped: AtomicU64,
    pub errors: AtomicU64,
    pub bytes: AtomicU64,
}

/// Executes swaps received over a channel.
///
/// Writes accumulate against a byte budget; at each budget boundary the
/// worker issues a durability barrier and only then deletes the source keys
/// written since the previous barrier, so a crash never leaves a block with
/// no durable copy.
pub(super) struct SwapWorker<'a> {
    ds: &'a dyn Datastore,
    /// When set, swaps between block keys move by a single file rename.
    layout: Option<&'a Flatfs>,
    blocks_prefix: DsKey,
    sync_size: u64,
    stats: &'a SwapStats,
    unsynced_bytes: u64,
    pending_delete: Vec<DsKey>,
}

impl<'a> SwapWorker<'a> {
    pub fn new(
        ds: &'a dyn Datastore,
        layout: Option<&'a Flatfs>,
        sync_size: u64,
        stats: &'a SwapStats,
    ) -> Self {
        Self {
            ds,
            layout,
            blocks_prefix: DsKey::new("/blocks"),
            sync_size: sync_size.max(1),
            stats,
            unsynced_bytes: 0,
            pending_delete: Vec::new(),
        }
    }

    /// Drains the channel, then runs the final barrier. Individual swap
    /// failures are counted, not fatal; the pass as a whole fails at the end
    /// when the error count is non-zero.
    pub fn run(mut self, rx: flume::Receiver<Swap>) {
        for swap in rx.iter() {
            match self.apply(&swap) {
                Ok(SwapState::Skipped) => {
                    self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                }
                Ok(_) => {
                    let done = self.stats.moved.fetch_add(1, Ordering::Relaxed) + 1;
                    if done % 100_000 == 0 {
                        info!("{done} keys moved so far");
                    }
                }
                Err(e) => {
                    warn!("swap {} -> {} failed: {e}", swap.old, swap.new);
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        if let Err(e) = self.barrier() {
            warn!("final durability barrier failed: {e}");
            self.stats.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn apply(&mut self, swap: &Swap) -> Result<SwapState, Error> {
        if let Some(layout) = self.fast_path_layout(swap) {
            return match layout.rename_file(swap.old.base_name(), swap.new.base_name()) {
                Ok(bytes) => {
                    trace!("renamed {} -> {}", swap.old, swap.new);
                    self.note_written(bytes)?;
                    Ok(SwapState::OldDeleted)
                }
                Err(Error::NotFound(_)) => {
                    warn!("{} is gone, treating as already moved", swap.old);
                    Ok(SwapState::Skipped)
                }
                Err(e) => Err(e),
            };
        }

        let value = match self.ds.get(&swap.old) {
            Ok(value) => value,
            Err(Error::NotFound(_)) => {
                warn!("{} is gone, treating as already moved", swap.old);
                return Ok(SwapState::Skipped);
            }
            Err(e) => return Err(e),
        };
        self.ds.put(&swap.new, &value)?;
        if !swap.keep_old {
            self.pending_delete.push(swap.old.clone());
        }
        self.note_written(value.len() as u64)?;
        Ok(SwapState::Written)
    }

    /// Only forward swaps confined to the block store may take the rename
    /// shortcut; a revert copies, it never moves.
    fn fast_path_layout(&self, swap: &Swap) -> Option<&'a Flatfs> {
        let layout = self.layout?;
        if swap.keep_old {
            return None;
        }
        (swap.old.is_under(&self.blocks_prefix) && swap.new.is_under(&self.blocks_prefix))
            .then_some(layout)
    }

    fn note_written(&mut self, bytes: u64) -> Result<(), Error> {
        self.stats.bytes.fetch_add(bytes, Ordering::Relaxed);
        self.unsynced_bytes += bytes;
        if self.unsynced_bytes >= self.sync_size {
            self.barrier()?;
        }
        Ok(())
    }

    /// Sync, delete the sources written since the last barrier, sync again.
    fn barrier(&mut self) -> Result<(), Error> {
        if self.unsynced_bytes == 0 && self.pending_delete.is_empty() {
            return Ok(());
        }
        self.ds.sync(&DsKey::root())?;
        for key in self.pending_delete.drain(..) {
            self.ds.delete(&key)?;
        }
        self.ds.sync(&DsKey::root())?;
        self.unsynced_bytes = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::LogDatastore;

    fn swap(old: &str, new: &str, keep_old: bool) -> Swap {
        Swap {
            old: DsKey::new(old),
            new: DsKey::new(new),
            keep_old,
        }
    }

    #[test]
    fn moves_value_and_defers_delete_to_barrier() {
        let dir = tempfile::tempdir().unwrap();
        let ds = LogDatastore::open(dir.path().join("datastore")).unwrap();
        ds.put(&DsKey::new("/blocks/OLD"), b"payload").unwrap();

        let stats = SwapStats::default();
        let mut worker = SwapWorker::new(&ds, None, u64::MAX, &stats);
        let state = worker.apply(&swap("/blocks/OLD", "/blocks/NEW", false)).unwrap();
        assert_eq!(state, SwapState::Written);

        // the old key survives until the barrier
        assert!(ds.has(&DsKey::new("/blocks/OLD")).unwrap());
        assert_eq!(ds.get(&DsKey::new("/blocks/NEW")).unwrap(), b"payload");

        worker.barrier().unwrap();
        assert!(!ds.has(&DsKey::new("/blocks/OLD")).unwrap());
    }

    #[test]
    fn tiny_sync_budget_deletes_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let ds = LogDatastore::open(dir.path().join("datastore")).unwrap();
        ds.put(&DsKey::new("/blocks/OLD"), b"payload").unwrap();

        let stats = SwapStats::default();
        let mut worker = SwapWorker::new(&ds, None, 1, &stats);
        worker.apply(&swap("/blocks/OLD", "/blocks/NEW", false)).unwrap();
        assert!(!ds.has(&DsKey::new("/blocks/OLD")).unwrap());
    }

    #[test]
    fn keep_old_leaves_the_source() {
        let dir = tempfile::tempdir().unwrap();
        let ds = LogDatastore::open(dir.path().join("datastore")).unwrap();
        ds.put(&DsKey::new("/blocks/MH"), b"payload").unwrap();

        let stats = SwapStats::default();
        let mut worker = SwapWorker::new(&ds, None, 1, &stats);
        worker.apply(&swap("/blocks/MH", "/blocks/CID", true)).unwrap();
        assert!(ds.has(&DsKey::new("/blocks/MH")).unwrap());
        assert!(ds.has(&DsKey::new("/blocks/CID")).unwrap());
    }

    #[test]
    fn missing_source_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let ds = LogDatastore::open(dir.path().join("datastore")).unwrap();

        let stats = SwapStats::default();
        let mut worker = SwapWorker::new(&ds, None, 1, &stats);
        let state = worker.apply(&swap("/blocks/GONE", "/blocks/NEW", false)).unwrap();
        assert_eq!(state, SwapState::Skipped);
        assert!(!ds.has(&DsKey::new("/blocks/NEW")).unwrap());
    }
}
