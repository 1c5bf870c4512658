// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The sharded-file block store and its on-disk layout.
//!
//! Each block lives in `<root>/<shard dir>/<name>.data`, where `name` is the
//! base-32 spelling of the key and the shard directory is computed by the
//! shard function declared in the `SHARDING` file at the store root.

use std::{
    collections::HashSet,
    fs,
    io::{ErrorKind, Write as _},
    path::{Path, PathBuf},
    sync::Mutex,
};

use serde_json::Value;
use tracing::trace;
use walkdir::WalkDir;

use super::{Datastore, DsKey, Entry, QueryIter};
use crate::error::Error;

pub const SHARDING_FILE: &str = "SHARDING";
pub const README_FILE: &str = "_README";
pub const DATA_SUFFIX: &str = ".data";

const SHARD_SPEC_PREFIX: &str = "/repo/flatfs/shard/v1";

const README_TEXT: &str = "This is a repository of IPLD objects. Each IPLD object is in a single file,
named <base32 encoding of key>.data. Where <base32 encoding of key> is the
\"base32\" encoding of the multihash of the object stored (with no padding).
All the object files are placed in a tree of directories, based on a function
of the key. The layout is defined by the SHARDING file in this directory.
";

/// The shard function declared by the `SHARDING` specification file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardFunc {
    /// Directory is the `n` characters next to the last character of the name.
    NextToLast(usize),
    /// Directory is the first `n` characters of the name.
    Prefix(usize),
}

impl ShardFunc {
    pub fn parse(spec: &str) -> Result<Self, Error> {
        let spec = spec.trim();
        let rest = spec
            .strip_prefix(SHARD_SPEC_PREFIX)
            .ok_or_else(|| Error::Corrupt(format!("unknown sharding spec {spec:?}")))?;
        let (name, n) = rest
            .trim_start_matches('/')
            .split_once('/')
            .ok_or_else(|| Error::Corrupt(format!("unknown sharding spec {spec:?}")))?;
        let n: usize = n
            .parse()
            .map_err(|_| Error::Corrupt(format!("bad shard width in {spec:?}")))?;
        if n == 0 {
            return Err(Error::Corrupt(format!("zero shard width in {spec:?}")));
        }
        match name {
            "next-to-last" => Ok(ShardFunc::NextToLast(n)),
            "prefix" => Ok(ShardFunc::Prefix(n)),
            _ => Err(Error::Corrupt(format!("unknown shard function {name:?}"))),
        }
    }

    pub fn to_spec(self) -> String {
        match self {
            ShardFunc::NextToLast(n) => format!("{SHARD_SPEC_PREFIX}/next-to-last/{n}"),
            ShardFunc::Prefix(n) => format!("{SHARD_SPEC_PREFIX}/prefix/{n}"),
        }
    }

    /// Shard directory for a file name (without the `.data` suffix). Short
    /// names are padded with `_`, matching the flatfs convention.
    pub fn dir_for(self, name: &str) -> String {
        match self {
            ShardFunc::Prefix(n) => {
                let mut dir: String = name.chars().take(n).collect();
                for _ in dir.chars().count()..n {
                    dir.push('_');
                }
                dir
            }
            ShardFunc::NextToLast(n) => {
                let mut padded: Vec<char> = Vec::new();
                while padded.len() + name.chars().count() < n + 1 {
                    padded.push('_');
                }
                padded.extend(name.chars());
                let end = padded.len() - 1;
                padded[end - n..end].iter().collect()
            }
        }
    }

    /// Reads the `SHARDING` file at a store root.
    pub fn read_from(root: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(root.join(SHARDING_FILE))?;
        Self::parse(&text)
    }

    /// Writes the `SHARDING` file and its `_README` companion.
    pub fn write_to(self, root: &Path) -> Result<(), Error> {
        fs::create_dir_all(root)?;
        fs::write(root.join(SHARDING_FILE), format!("{}\n", self.to_spec()))?;
        fs::write(root.join(README_FILE), README_TEXT)?;
        Ok(())
    }
}

/// The block store proper. Keys are flat: the base name of the datastore key
/// is the file stem, so `/CIQ…` maps to `<shard>/CIQ….data`.
pub struct Flatfs {
    root: PathBuf,
    shard: ShardFunc,
    dirty_dirs: Mutex<HashSet<PathBuf>>,
}

impl Flatfs {
    /// Opens an existing store, reading its shard function from `SHARDING`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();
        let shard = ShardFunc::read_from(&root)?;
        Ok(Self {
            root,
            shard,
            dirty_dirs: Mutex::new(HashSet::new()),
        })
    }

    /// Creates a new store with the given shard function.
    pub fn create(root: impl Into<PathBuf>, shard: ShardFunc) -> Result<Self, Error> {
        let root = root.into();
        shard.write_to(&root)?;
        Ok(Self {
            root,
            shard,
            dirty_dirs: Mutex::new(HashSet::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn shard(&self) -> ShardFunc {
        self.shard
    }

    /// The concrete `(directory, file)` pair for a file name. This is the
    /// layout knowledge the key-rewrite fast path uses to move blocks with a
    /// single rename.
    pub fn file_path(&self, name: &str) -> (PathBuf, PathBuf) {
        let dir = self.root.join(self.shard.dir_for(name));
        let file = dir.join(format!("{name}{DATA_SUFFIX}"));
        (dir, file)
    }

    /// Moves a block to a new name with a single rename, creating the
    /// destination shard directory as needed. Returns the moved file's size.
    /// This costs no extra write amplification, unlike a get/put/delete.
    pub fn rename_file(&self, old_name: &str, new_name: &str) -> Result<u64, Error> {
        let (old_dir, old_file) = self.file_path(old_name);
        let size = match fs::metadata(&old_file) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::NotFound(old_name.to_owned()));
            }
            Err(e) => return Err(Error::Io(e)),
        };
        let (new_dir, new_file) = self.file_path(new_name);
        fs::create_dir_all(&new_dir)?;
        fs::rename(&old_file, &new_file)?;
        self.mark_dirty(old_dir);
        self.mark_dirty(new_dir);
        Ok(size)
    }

    fn mark_dirty(&self, dir: PathBuf) {
        self.dirty_dirs.lock().expect("poisoned flatfs lock").insert(dir);
    }
}

impl Datastore for Flatfs {
    fn get(&self, key: &DsKey) -> Result<Vec<u8>, Error> {
        let (_, file) = self.file_path(key.base_name());
        match fs::read(&file) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(Error::NotFound(key.to_string()))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn put(&self, key: &DsKey, value: &[u8]) -> Result<(), Error> {
        let (dir, file) = self.file_path(key.base_name());
        fs::create_dir_all(&dir)?;
        let mut temp = tempfile::NamedTempFile::new_in(&self.root)?;
        temp.write_all(value)?;
        temp.as_file().sync_all()?;
        temp.persist(&file).map_err(|e| Error::Io(e.error))?;
        trace!("flatfs put {key} -> {}", file.display());
        self.mark_dirty(dir);
        Ok(())
    }

    fn delete(&self, key: &DsKey) -> Result<(), Error> {
        let (dir, file) = self.file_path(key.base_name());
        match fs::remove_file(&file) {
            Ok(()) => {
                self.mark_dirty(dir);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn has(&self, key: &DsKey) -> Result<bool, Error> {
        let (_, file) = self.file_path(key.base_name());
        Ok(file.exists())
    }

    fn query(&self, prefix: &DsKey, keys_only: bool) -> Result<QueryIter<'_>, Error> {
        let prefix = prefix.clone();
        let iter = WalkDir::new(&self.root)
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_map(move |entry| match entry {
                Ok(entry) => {
                    let name = entry.file_name().to_str()?;
                    let stem = name.strip_suffix(DATA_SUFFIX)?;
                    let key = DsKey::new(stem);
                    if !key.is_under(&prefix) {
                        return None;
                    }
                    let value = if keys_only {
                        None
                    } else {
                        match fs::read(entry.path()) {
                            Ok(bytes) => Some(bytes),
                            Err(e) => return Some(Err(Error::Io(e))),
                        }
                    };
                    Some(Ok(Entry { key, value }))
                }
                Err(e) => Some(Err(Error::Io(std::io::Error::other(e)))),
            });
        Ok(Box::new(iter))
    }

    fn sync(&self, _prefix: &DsKey) -> Result<(), Error> {
        let dirs: Vec<_> = {
            let mut dirty = self.dirty_dirs.lock().expect("poisoned flatfs lock");
            dirty.drain().collect()
        };
        for dir in dirs {
            sync_dir(&dir)?;
        }
        sync_dir(&self.root)?;
        Ok(())
    }
}

fn sync_dir(dir: &Path) -> Result<(), Error> {
    match fs::File::open(dir) {
        Ok(handle) => {
            handle.sync_all()?;
            Ok(())
        }
        // a dirty dir may have been removed again before the barrier
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io(e)),
    }
}

/// Whether the configured `Datastore.Spec` describes a plain flatfs block
/// store, directly mounted or behind the usual `measure` wrapper. Only then
/// is the rename fast path safe, because only then do the layout's paths and
/// the adapter's view agree.
pub fn is_basic_flatfs_spec(spec: &Value) -> bool {
    if spec.get("type").and_then(Value::as_str) != Some("mount") {
        return false;
    }
    let Some(mounts) = spec.get("mounts").and_then(Value::as_array) else {
        return false;
    };
    let Some(blocks) = mounts
        .iter()
        .find(|m| m.get("mountpoint").and_then(Value::as_str) == Some("/blocks"))
    else {
        return false;
    };
    match blocks.get("type").and_then(Value::as_str) {
        Some("flatfs") => true,
        Some("measure") => {
            blocks
                .get("child")
                .and_then(|c| c.get("type"))
                .and_then(Value::as_str)
                == Some("flatfs")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn shard_spec_round_trips() {
        for spec in ["/repo/flatfs/shard/v1/next-to-last/2", "/repo/flatfs/shard/v1/prefix/5"] {
            assert_eq!(ShardFunc::parse(spec).unwrap().to_spec(), spec);
        }
        assert!(ShardFunc::parse("/repo/flatfs/shard/v2/next-to-last/2").is_err());
        assert!(ShardFunc::parse("/repo/flatfs/shard/v1/suffix/2").is_err());
        assert!(ShardFunc::parse("/repo/flatfs/shard/v1/prefix/zero").is_err());
    }

    #[test]
    fn next_to_last_sharding() {
        let shard = ShardFunc::NextToLast(2);
        assert_eq!(shard.dir_for("CIQABCDEF"), "DE");
        // short names pad with underscores
        assert_eq!(shard.dir_for("AB"), "_A");
        assert_eq!(shard.dir_for("A"), "__");
    }

    #[test]
    fn prefix_sharding() {
        let shard = ShardFunc::Prefix(4);
        assert_eq!(shard.dir_for("CIQABCDEF"), "CIQA");
        assert_eq!(shard.dir_for("AB"), "AB__");
    }

    #[test]
    fn sharding_handles_multibyte_names() {
        // names are base-32 in practice, but a foreign key must not panic
        assert_eq!(ShardFunc::Prefix(2).dir_for("é×ZZ"), "é×");
        assert_eq!(ShardFunc::Prefix(3).dir_for("é"), "é__");
        assert_eq!(ShardFunc::NextToLast(2).dir_for("AéZ×Q"), "Z×");
    }

    #[test]
    fn put_get_delete_query() {
        let dir = tempfile::tempdir().unwrap();
        let fs = Flatfs::create(dir.path().join("blocks"), ShardFunc::NextToLast(2)).unwrap();

        let key = DsKey::new("/CIQABCDEF");
        fs.put(&key, b"hello").unwrap();
        assert_eq!(fs.get(&key).unwrap(), b"hello");
        assert!(dir.path().join("blocks/DE/CIQABCDEF.data").exists());

        let entries: Vec<_> = fs
            .query(&DsKey::root(), false)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, key);
        assert_eq!(entries[0].value.as_deref(), Some(&b"hello"[..]));

        fs.sync(&DsKey::root()).unwrap();
        fs.delete(&key).unwrap();
        assert!(matches!(fs.get(&key), Err(Error::NotFound(_))));
        // deleting again is a no-op
        fs.delete(&key).unwrap();
    }

    #[test]
    fn rename_moves_across_shard_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let fs = Flatfs::create(dir.path().join("blocks"), ShardFunc::NextToLast(2)).unwrap();
        fs.put(&DsKey::new("/CIQABCDEF"), b"hello").unwrap();

        let size = fs.rename_file("CIQABCDEF", "XYZPQRST").unwrap();
        assert_eq!(size, 5);
        assert!(!dir.path().join("blocks/DE/CIQABCDEF.data").exists());
        assert!(dir.path().join("blocks/RS/XYZPQRST.data").exists());
        assert_eq!(fs.get(&DsKey::new("/XYZPQRST")).unwrap(), b"hello");

        assert!(matches!(
            fs.rename_file("CIQABCDEF", "OTHER"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn reopen_reads_sharding_file() {
        let dir = tempfile::tempdir().unwrap();
        Flatfs::create(dir.path().join("blocks"), ShardFunc::Prefix(3)).unwrap();
        let reopened = Flatfs::open(dir.path().join("blocks")).unwrap();
        assert_eq!(reopened.shard(), ShardFunc::Prefix(3));
    }

    #[test]
    fn basic_flatfs_detection() {
        let plain = json!({
            "type": "mount",
            "mounts": [
                {"mountpoint": "/blocks", "type": "flatfs", "path": "blocks"},
                {"mountpoint": "/", "type": "levelds", "path": "datastore"}
            ]
        });
        assert!(is_basic_flatfs_spec(&plain));

        let measured = json!({
            "type": "mount",
            "mounts": [
                {
                    "mountpoint": "/blocks",
                    "type": "measure",
                    "prefix": "flatfs.datastore",
                    "child": {"type": "flatfs", "path": "blocks"}
                }
            ]
        });
        assert!(is_basic_flatfs_spec(&measured));

        let badger = json!({"type": "badgerds", "path": "badgerds"});
        assert!(!is_basic_flatfs_spec(&badger));

        let wrapped = json!({
            "type": "mount",
            "mounts": [
                {"mountpoint": "/blocks", "type": "log", "child": {"type": "flatfs"}}
            ]
        });
        assert!(!is_basic_flatfs_spec(&wrapped));
    }
}
