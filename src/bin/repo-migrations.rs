// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

fn main() {
    repo_migrations::logger::setup_logger();
    if let Err(e) = repo_migrations::cli::main(std::env::args()) {
        tracing::error!("{e:#}");
        std::process::exit(1);
    }
}
