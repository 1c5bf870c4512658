// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! A small log-structured key/value store for repository metadata (pins,
//! settings, the mutable-file-system root).
//!
//! All records live in a single append-only log. Opening replays the log into
//! an in-memory map; a torn record at the tail (crash mid-append) is dropped
//! with a warning, so a store touched by an interrupted migration reopens
//! cleanly with every completed write visible.

use std::{
    collections::BTreeMap,
    fs::{File, OpenOptions},
    io::{BufReader, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::{debug, warn};

use super::{Datastore, DsKey, Entry, QueryIter};
use crate::error::Error;

const LOG_FILE: &str = "data.log";

const OP_PUT: u8 = 1;
const OP_DELETE: u8 = 2;

pub struct LogDatastore {
    inner: Mutex<Inner>,
    path: PathBuf,
}

struct Inner {
    log: BufWriter<File>,
    map: BTreeMap<String, Vec<u8>>,
}

impl LogDatastore {
    /// Opens (or creates) the store rooted at `dir`, replaying the log.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(LOG_FILE);

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;
        let map = replay(&mut file, &path)?;
        file.seek(SeekFrom::End(0))?;

        debug!("opened log datastore at {} with {} keys", path.display(), map.len());
        Ok(Self {
            inner: Mutex::new(Inner {
                log: BufWriter::new(file),
                map,
            }),
            path,
        })
    }

    fn with_inner<T>(&self, f: impl FnOnce(&mut Inner) -> Result<T, Error>) -> Result<T, Error> {
        let mut inner = self.inner.lock().expect("poisoned log datastore lock");
        f(&mut inner)
    }
}

fn replay(file: &mut File, path: &Path) -> Result<BTreeMap<String, Vec<u8>>, Error> {
    let mut map = BTreeMap::new();
    let mut reader = BufReader::new(file);
    loop {
        let op = match reader.read_u8() {
            Ok(op) => op,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(Error::Io(e)),
        };
        match read_record(&mut reader, op) {
            Ok((key, value)) => match value {
                Some(value) => {
                    map.insert(key, value);
                }
                None => {
                    map.remove(&key);
                }
            },
            Err(Error::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                warn!("dropping torn record at the tail of {}", path.display());
                break;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(map)
}

fn read_record(reader: &mut impl Read, op: u8) -> Result<(String, Option<Vec<u8>>), Error> {
    let key_len = reader.read_u32::<LittleEndian>()? as usize;
    let mut key = vec![0u8; key_len];
    reader.read_exact(&mut key)?;
    let key = String::from_utf8(key)
        .map_err(|_| Error::Corrupt("log record key is not UTF-8".into()))?;
    match op {
        OP_PUT => {
            let val_len = reader.read_u32::<LittleEndian>()? as usize;
            let mut value = vec![0u8; val_len];
            reader.read_exact(&mut value)?;
            Ok((key, Some(value)))
        }
        OP_DELETE => Ok((key, None)),
        other => Err(Error::Corrupt(format!("unknown log record op {other}"))),
    }
}

fn append_record(
    log: &mut BufWriter<File>,
    op: u8,
    key: &str,
    value: Option<&[u8]>,
) -> Result<(), Error> {
    log.write_u8(op)?;
    log.write_u32::<LittleEndian>(key.len() as u32)?;
    log.write_all(key.as_bytes())?;
    if let Some(value) = value {
        log.write_u32::<LittleEndian>(value.len() as u32)?;
        log.write_all(value)?;
    }
    Ok(())
}

impl Datastore for LogDatastore {
    fn get(&self, key: &DsKey) -> Result<Vec<u8>, Error> {
        self.with_inner(|inner| {
            inner
                .map
                .get(key.as_str())
                .cloned()
                .ok_or_else(|| Error::NotFound(key.to_string()))
        })
    }

    fn put(&self, key: &DsKey, value: &[u8]) -> Result<(), Error> {
        self.with_inner(|inner| {
            append_record(&mut inner.log, OP_PUT, key.as_str(), Some(value))?;
            inner.map.insert(key.to_string(), value.to_vec());
            Ok(())
        })
    }

    fn delete(&self, key: &DsKey) -> Result<(), Error> {
        self.with_inner(|inner| {
            if inner.map.remove(key.as_str()).is_some() {
                append_record(&mut inner.log, OP_DELETE, key.as_str(), None)?;
            }
            Ok(())
        })
    }

    fn query(&self, prefix: &DsKey, keys_only: bool) -> Result<QueryIter<'_>, Error> {
        let entries = self.with_inner(|inner| {
            Ok(inner
                .map
                .iter()
                .filter(|(k, _)| DsKey::new(k).is_under(prefix))
                .map(|(k, v)| Entry {
                    key: DsKey::new(k),
                    value: (!keys_only).then(|| v.clone()),
                })
                .collect::<Vec<_>>())
        })?;
        Ok(Box::new(entries.into_iter().map(Ok)))
    }

    fn sync(&self, _prefix: &DsKey) -> Result<(), Error> {
        self.with_inner(|inner| {
            inner.log.flush()?;
            inner.log.get_ref().sync_all()?;
            Ok(())
        })
    }
}

impl Drop for LogDatastore {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.lock() {
            if let Err(e) = inner.log.flush() {
                warn!("failed to flush log datastore at {}: {e}", self.path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("datastore");
        {
            let ds = LogDatastore::open(&root).unwrap();
            ds.put(&DsKey::new("/pins/direct"), b"[]").unwrap();
            ds.put(&DsKey::new("/local/filesroot"), b"root").unwrap();
            ds.put(&DsKey::new("/pins/direct"), b"[\"a\"]").unwrap();
            ds.delete(&DsKey::new("/local/filesroot")).unwrap();
            ds.sync(&DsKey::root()).unwrap();
        }
        let ds = LogDatastore::open(&root).unwrap();
        assert_eq!(ds.get(&DsKey::new("/pins/direct")).unwrap(), b"[\"a\"]");
        assert!(matches!(
            ds.get(&DsKey::new("/local/filesroot")),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn prefix_query() {
        let dir = tempfile::tempdir().unwrap();
        let ds = LogDatastore::open(dir.path().join("datastore")).unwrap();
        ds.put(&DsKey::new("/pins/a"), b"1").unwrap();
        ds.put(&DsKey::new("/pins/b"), b"2").unwrap();
        ds.put(&DsKey::new("/pinset"), b"3").unwrap();

        let keys: Vec<_> = ds
            .query(&DsKey::new("/pins"), true)
            .unwrap()
            .map(|e| e.unwrap().key.to_string())
            .collect();
        assert_eq!(keys, vec!["/pins/a", "/pins/b"]);
    }

    #[test]
    fn torn_tail_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("datastore");
        {
            let ds = LogDatastore::open(&root).unwrap();
            ds.put(&DsKey::new("/ok"), b"fine").unwrap();
            ds.sync(&DsKey::root()).unwrap();
        }
        // simulate a crash mid-append
        let mut file = OpenOptions::new()
            .append(true)
            .open(root.join(LOG_FILE))
            .unwrap();
        file.write_all(&[OP_PUT, 200, 0, 0, 0, b'/']).unwrap();
        drop(file);

        let ds = LogDatastore::open(&root).unwrap();
        assert_eq!(ds.get(&DsKey::new("/ok")).unwrap(), b"fine");
        assert_eq!(ds.query(&DsKey::root(), true).unwrap().count(), 1);
    }
}
