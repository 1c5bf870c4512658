// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Uniform access to the node's on-disk key/value stores.
//!
//! The migration engine sees a single key space: `/blocks/*` routes to the
//! sharded-file block store, everything else to the log-structured metadata
//! store. Implementations must tolerate a partially completed migration,
//! since a second run sees the prior writes.

pub mod flatfs;
pub mod key;
pub mod log;
pub mod mount;

use std::{path::Path, sync::Arc};

pub use flatfs::{Flatfs, ShardFunc};
pub use key::DsKey;
pub use log::LogDatastore;
pub use mount::Mount;

use crate::error::Error;
use crate::repo::{BLOCKS_DIR, DATASTORE_DIR};

/// One result of a [`Datastore::query`]. The value is absent for keys-only
/// queries.
pub struct Entry {
    pub key: DsKey,
    pub value: Option<Vec<u8>>,
}

pub type QueryIter<'a> = Box<dyn Iterator<Item = Result<Entry, Error>> + Send + 'a>;

pub trait Datastore: Send + Sync {
    /// Returns the value at `key`, or [`Error::NotFound`].
    fn get(&self, key: &DsKey) -> Result<Vec<u8>, Error>;

    fn put(&self, key: &DsKey, value: &[u8]) -> Result<(), Error>;

    /// Removes `key`. Deleting an absent key is a no-op, which keeps reverts
    /// idempotent.
    fn delete(&self, key: &DsKey) -> Result<(), Error>;

    fn has(&self, key: &DsKey) -> Result<bool, Error> {
        match self.get(key) {
            Ok(_) => Ok(true),
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Streams entries under `prefix` in unspecified order.
    fn query(&self, prefix: &DsKey, keys_only: bool) -> Result<QueryIter<'_>, Error>;

    /// Durability barrier: all writes under `prefix` issued before this call
    /// are on stable storage when it returns.
    fn sync(&self, prefix: &DsKey) -> Result<(), Error>;
}

/// Optional grouping of writes. There is no transactional promise; commit
/// falls back to per-operation writes in order.
pub struct Batch<'a> {
    ds: &'a dyn Datastore,
    ops: Vec<BatchOp>,
}

enum BatchOp {
    Put(DsKey, Vec<u8>),
    Delete(DsKey),
}

impl<'a> Batch<'a> {
    pub fn new(ds: &'a dyn Datastore) -> Self {
        Self { ds, ops: Vec::new() }
    }

    pub fn put(&mut self, key: DsKey, value: Vec<u8>) {
        self.ops.push(BatchOp::Put(key, value));
    }

    pub fn delete(&mut self, key: DsKey) {
        self.ops.push(BatchOp::Delete(key));
    }

    pub fn commit(self) -> Result<(), Error> {
        for op in self.ops {
            match op {
                BatchOp::Put(key, value) => self.ds.put(&key, &value)?,
                BatchOp::Delete(key) => self.ds.delete(&key)?,
            }
        }
        Ok(())
    }
}

/// Opens the repository's standard mount composition: the sharded block store
/// under `/blocks`, the metadata store at `/`. Returns the mount plus a typed
/// handle on the block store for the flatfs fast path.
pub fn open_repo_datastore(repo: &Path) -> Result<(Mount, Arc<Flatfs>), Error> {
    let blocks = Arc::new(Flatfs::open(repo.join(BLOCKS_DIR))?);
    let meta = Arc::new(LogDatastore::open(repo.join(DATASTORE_DIR))?);
    let mount = Mount::new(vec![
        (DsKey::new("/blocks"), blocks.clone() as Arc<dyn Datastore>),
        (DsKey::root(), meta as Arc<dyn Datastore>),
    ]);
    Ok((mount, blocks))
}
