// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Well-known names inside a repository and the primitives every migration
//! step shares: the advisory repo lock and the plaintext version file.

pub mod lock;
pub mod version;

pub use lock::RepoLock;
pub use version::{check_version, read_version, write_version, VERSION_FILE};

/// JSON configuration document at the repo root.
pub const CONFIG_FILE: &str = "config";
/// Sharded block store directory.
pub const BLOCKS_DIR: &str = "blocks";
/// Log-structured metadata store directory.
pub const DATASTORE_DIR: &str = "datastore";
/// One file per key, named after the base-32 encoded key name.
pub const KEYSTORE_DIR: &str = "keystore";
