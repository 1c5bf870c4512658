// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Composition of several stores into one key space. Keys route to the mount
//! with the longest matching prefix; entries coming back out of a query are
//! re-prefixed with their mount point.

use std::sync::Arc;

use super::{Datastore, DsKey, Entry, QueryIter};
use crate::error::Error;

pub struct Mount {
    /// Sorted longest prefix first, so lookup is first-match.
    mounts: Vec<(DsKey, Arc<dyn Datastore>)>,
}

impl Mount {
    pub fn new(mut mounts: Vec<(DsKey, Arc<dyn Datastore>)>) -> Self {
        mounts.sort_by(|(a, _), (b, _)| b.as_str().len().cmp(&a.as_str().len()));
        Self { mounts }
    }

    fn route(&self, key: &DsKey) -> Result<(&DsKey, &Arc<dyn Datastore>, DsKey), Error> {
        self.mounts
            .iter()
            .find(|(point, _)| key.is_under(point))
            .map(|(point, ds)| {
                let rest = key.strip_prefix(point).expect("key is under mount point");
                (point, ds, rest)
            })
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }
}

impl Datastore for Mount {
    fn get(&self, key: &DsKey) -> Result<Vec<u8>, Error> {
        let (_, ds, rest) = self.route(key)?;
        ds.get(&rest).map_err(|e| match e {
            // report the caller's key, not the stripped one
            Error::NotFound(_) => Error::NotFound(key.to_string()),
            other => other,
        })
    }

    fn put(&self, key: &DsKey, value: &[u8]) -> Result<(), Error> {
        let (_, ds, rest) = self.route(key)?;
        ds.put(&rest, value)
    }

    fn delete(&self, key: &DsKey) -> Result<(), Error> {
        let (_, ds, rest) = self.route(key)?;
        ds.delete(&rest)
    }

    fn query(&self, prefix: &DsKey, keys_only: bool) -> Result<QueryIter<'_>, Error> {
        let mut iters: Vec<QueryIter<'_>> = Vec::new();
        for (point, ds) in &self.mounts {
            // a mount participates when it lies under the prefix or vice versa
            let inner_prefix = if point.is_under(prefix) {
                DsKey::root()
            } else if prefix.is_under(point) {
                prefix.strip_prefix(point).expect("prefix is under mount")
            } else {
                continue;
            };
            let point = point.clone();
            let iter = ds.query(&inner_prefix, keys_only)?.map(move |entry| {
                entry.map(|e| Entry {
                    key: e.key.with_prefix(&point),
                    value: e.value,
                })
            });
            iters.push(Box::new(iter));
        }
        Ok(Box::new(iters.into_iter().flatten()))
    }

    fn sync(&self, prefix: &DsKey) -> Result<(), Error> {
        for (point, ds) in &self.mounts {
            if point.is_under(prefix) || prefix.is_under(point) {
                let inner = prefix.strip_prefix(point).unwrap_or_else(DsKey::root);
                ds.sync(&inner)?;
            }
        }
        Ok(())
    }
}
