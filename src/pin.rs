// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Read-only view of the pin set and the mutable-file-system root.
//!
//! The engine does not own pin storage; the key-rewrite revert merely needs
//! to know which content identifiers the downgraded node will still look up.
//! The capability is a narrow trait accepted at construction so callers can
//! substitute the node's real pinning subsystem.

use cid::Cid;

use crate::datastore::{key::DsKey, Datastore};
use crate::error::Error;

pub trait PinLookup {
    /// All directly and recursively pinned content identifiers.
    fn pinned_cids(&self) -> anyhow::Result<Vec<Cid>>;

    /// The current mutable-file-system root, if one is set.
    fn files_root(&self) -> anyhow::Result<Option<Cid>>;
}

const DIRECT_PINS_KEY: &str = "/pins/direct";
const RECURSIVE_PINS_KEY: &str = "/pins/recursive";
const FILES_ROOT_KEY: &str = "/local/filesroot";

/// Default implementation backed by the metadata datastore: pin sets are JSON
/// arrays of CID strings, the files root is raw CID bytes.
pub struct StoredPins<'a> {
    ds: &'a dyn Datastore,
}

impl<'a> StoredPins<'a> {
    pub fn new(ds: &'a dyn Datastore) -> Self {
        Self { ds }
    }

    fn read_pin_list(&self, key: &str) -> anyhow::Result<Vec<Cid>> {
        let bytes = match self.ds.get(&DsKey::new(key)) {
            Ok(bytes) => bytes,
            Err(Error::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let names: Vec<String> = serde_json::from_slice(&bytes)?;
        names
            .iter()
            .map(|name| {
                name.parse()
                    .map_err(|e| anyhow::anyhow!("pin entry {name:?} is not a CID: {e}"))
            })
            .collect()
    }
}

impl PinLookup for StoredPins<'_> {
    fn pinned_cids(&self) -> anyhow::Result<Vec<Cid>> {
        let mut cids = self.read_pin_list(DIRECT_PINS_KEY)?;
        cids.extend(self.read_pin_list(RECURSIVE_PINS_KEY)?);
        Ok(cids)
    }

    fn files_root(&self) -> anyhow::Result<Option<Cid>> {
        let bytes = match self.ds.get(&DsKey::new(FILES_ROOT_KEY)) {
            Ok(bytes) => bytes,
            Err(Error::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(Cid::try_from(bytes.as_slice()).map_err(|e| {
            anyhow::anyhow!("files root is not a CID: {e}")
        })?))
    }
}
