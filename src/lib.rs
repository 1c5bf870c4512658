// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! On-disk repository migration engine for a content-addressed storage node.
//!
//! A repository's layout version lives in its `version` file; this crate
//! carries one [`migration::MigrationStep`] per adjacent version pair and a
//! driver that walks the chain between any two versions, in either direction.

pub mod cli;
pub mod config;
pub mod datastore;
pub mod error;
pub mod fetcher;
pub mod logger;
pub mod migration;
pub mod pin;
pub mod repo;
pub mod utils;
