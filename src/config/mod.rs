// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Loosely typed editing of the JSON configuration document.
//!
//! Migrations treat the config as a [`serde_json::Value`] tree so that
//! unknown fields survive verbatim. Transforms are pure functions over the
//! tree; if a field is missing or has an unexpected shape the transform logs
//! and leaves it alone.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde_json::Value;
use tracing::debug;

use crate::utils::io::write_file_atomic;

/// Decodes the JSON document at `path` into a dynamic tree.
pub fn load_tree(path: &Path) -> anyhow::Result<Value> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("config at {} is not valid JSON", path.display()))
}

/// Encodes the tree with two-space indent and a trailing newline, then
/// atomically replaces `path` (mode 0600).
pub fn save_tree(path: &Path, tree: &Value) -> anyhow::Result<()> {
    let mut out = serde_json::to_vec_pretty(tree)?;
    out.push(b'\n');
    write_file_atomic(path, &out)
        .with_context(|| format!("writing config at {}", path.display()))
}

/// Copies the original document to `path + suffix`, then saves the tree.
/// The backup is byte-identical to the pre-transform original, which is what
/// makes config reverts exact.
pub fn backup_then_save(path: &Path, tree: &Value, suffix: &str) -> anyhow::Result<()> {
    let backup = backup_path(path, suffix);
    std::fs::copy(path, &backup)
        .with_context(|| format!("backing up config to {}", backup.display()))?;
    save_tree(path, tree)
}

/// Renames `path + suffix` back over `path`.
pub fn restore_backup(path: &Path, suffix: &str) -> anyhow::Result<()> {
    let backup = backup_path(path, suffix);
    std::fs::rename(&backup, path)
        .with_context(|| format!("restoring config backup {}", backup.display()))?;
    Ok(())
}

pub fn backup_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Case-insensitive lookup of a top-level section. Legacy writers disagreed
/// on the casing of the `datastore` section; reads tolerate any casing while
/// the 4-to-5 step rewrites it canonically.
pub fn section_mut<'a>(tree: &'a mut Value, name: &str) -> Option<&'a mut Value> {
    let obj = tree.as_object_mut()?;
    let key = obj
        .keys()
        .find(|k| k.eq_ignore_ascii_case(name))?
        .to_owned();
    obj.get_mut(&key)
}

/// Rewrites any top-level key that differs from `canonical` only by case.
/// No-op when the canonical key is already present alongside a variant.
pub fn canonicalize_section(tree: &mut Value, canonical: &str) {
    let Some(obj) = tree.as_object_mut() else {
        debug!("config root is not an object, leaving casing alone");
        return;
    };
    if obj.contains_key(canonical) {
        return;
    }
    let variant = obj
        .keys()
        .find(|k| k.eq_ignore_ascii_case(canonical) && k.as_str() != canonical)
        .cloned();
    if let Some(variant) = variant {
        let value = obj.remove(&variant).expect("key was just found");
        obj.insert(canonical.to_owned(), value);
    }
}
