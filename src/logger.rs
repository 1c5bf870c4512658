// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use tracing_subscriber::EnvFilter;

/// Console logger on stderr, filtered by `RUST_LOG` with an `info` default.
/// Stdout stays clean for the `-v` output.
pub fn setup_logger() {
    tracing_subscriber::fmt()
        .with_env_filter(get_env_filter())
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn get_env_filter() -> EnvFilter {
    use std::env::{
        self,
        VarError::{NotPresent, NotUnicode},
    };
    match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(s) => EnvFilter::new(s),
        Err(NotPresent) => EnvFilter::new("info"),
        Err(NotUnicode(_)) => EnvFilter::default(),
    }
}
