// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! 3-to-4: rewrites the bootstrap peer list. The `/ipfs/` protocol token
//! becomes `/p2p/`, long-dead bootstrap peers are dropped, and the DNS-based
//! bootstrappers are added. The revert is multi-phase: restoring the config
//! consumes the backup, so the version bump must be resumable if the process
//! dies in between.

use serde_json::Value;
use tracing::{info, warn};

use super::revert_phase::RevertPhase;
use super::{backup_suffix, MigrationStep, Options};
use crate::config;
use crate::repo::{check_version, write_version, RepoLock, CONFIG_FILE};

const DNS_BOOTSTRAP: &[&str] = &[
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmNnooDu7bfjPFoTZYxMNLWUQJyrVwtbZg5gBMjTezGAJN",
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmQCU2EcMqAqQPR2i9bChDtGNJchTbq5TbXJJ16u19uLTa",
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmbLHAnMoJPWSCR5Zhtx6BHJX9KiKNN6tpvbUcqanj75Nb",
];

/// Bootstrap peers retired upstream; connecting to them only wastes dials.
const DEPRECATED_PEER_IDS: &[&str] = &[
    "QmSoLV4Bbm51jM9C4gDYZQ9Cy3U6aXMJDAbzgu2fzaDs64",
    "QmSoLer265NRgSp2LA3dPaeykiS1J6DifTC88f5uVQKNAd",
];

pub(super) struct Migration3_4;

impl MigrationStep for Migration3_4 {
    fn versions(&self) -> &str {
        "3-to-4"
    }

    fn reversible(&self) -> bool {
        true
    }

    fn apply(&self, opts: &Options) -> anyhow::Result<()> {
        let _lock = RepoLock::lock(&opts.repo)?;
        RevertPhase::clear(&opts.repo)?;
        super::apply_config_step_locked(opts, 3, 4, |tree| {
            rewrite_bootstrap(tree);
            Ok(())
        })
    }

    fn revert(&self, opts: &Options) -> anyhow::Result<()> {
        let _lock = RepoLock::lock(&opts.repo)?;
        check_version(&opts.repo, 4)?;

        let mut phase = RevertPhase::load(&opts.repo)?;
        if phase.should_run(0) {
            config::restore_backup(&opts.repo.join(CONFIG_FILE), &backup_suffix(3, 4))?;
            phase.complete(0)?;
        }
        if phase.should_run(1) {
            write_version(&opts.repo, 3)?;
            phase.complete(1)?;
        }
        phase.finish()?;
        info!("repository reverted to version 3");
        Ok(())
    }
}

fn rewrite_bootstrap(tree: &mut Value) {
    let Some(list) = tree.get_mut("Bootstrap").and_then(Value::as_array_mut) else {
        warn!("config has no Bootstrap list, leaving it alone");
        return;
    };

    let mut rewritten: Vec<Value> = Vec::with_capacity(list.len());
    for entry in list.iter() {
        let Some(addr) = entry.as_str() else {
            warn!("non-string bootstrap entry {entry}, keeping verbatim");
            rewritten.push(entry.clone());
            continue;
        };
        if DEPRECATED_PEER_IDS.iter().any(|id| addr.ends_with(id)) {
            info!("dropping deprecated bootstrap peer {addr}");
            continue;
        }
        rewritten.push(Value::String(addr.replace("/ipfs/", "/p2p/")));
    }
    for dns in DNS_BOOTSTRAP {
        if !rewritten.iter().any(|e| e.as_str() == Some(dns)) {
            rewritten.push(Value::String((*dns).to_owned()));
        }
    }
    *list = rewritten;
}
