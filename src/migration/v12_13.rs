// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! 12-to-13: every `/quic` address gains `/quic-v1` and
//! `/quic-v1/webtransport` siblings, and connection-manager settings still
//! carrying the legacy defaults collapse back to implicit ones.

use serde_json::{json, Value};
use tracing::debug;

use super::{MigrationStep, Options};

pub(super) struct Migration12_13;

impl MigrationStep for Migration12_13 {
    fn versions(&self) -> &str {
        "12-to-13"
    }

    fn reversible(&self) -> bool {
        true
    }

    fn apply(&self, opts: &Options) -> anyhow::Result<()> {
        super::apply_config_step(opts, 12, 13, |tree| {
            for list in ["Swarm", "Announce", "AppendAnnounce", "NoAnnounce"] {
                add_quic_v1_addresses(tree, list);
            }
            collapse_connmgr_defaults(tree);
            Ok(())
        })
    }

    fn revert(&self, opts: &Options) -> anyhow::Result<()> {
        super::revert_config_step(opts, 12, 13)
    }
}

/// For an address whose terminal protocol is `/quic`, the `/quic-v1` and
/// webtransport variants to add.
fn quic_v1_variants(addr: &str) -> Option<[String; 2]> {
    let base = addr.strip_suffix("/quic")?;
    Some([format!("{base}/quic-v1"), format!("{base}/quic-v1/webtransport")])
}

fn add_quic_v1_addresses(tree: &mut Value, list: &str) {
    let Some(addrs) = tree
        .get_mut("Addresses")
        .and_then(|a| a.get_mut(list))
        .and_then(Value::as_array_mut)
    else {
        debug!("config has no Addresses.{list} list, leaving it alone");
        return;
    };
    let additions: Vec<String> = addrs
        .iter()
        .filter_map(Value::as_str)
        .filter_map(quic_v1_variants)
        .flatten()
        .filter(|variant| !addrs.iter().any(|a| a.as_str() == Some(variant)))
        .collect();
    addrs.extend(additions.into_iter().map(Value::String));
}

fn legacy_connmgr_defaults() -> Vec<(&'static str, Value)> {
    vec![
        ("Type", json!("basic")),
        ("LowWater", json!(600)),
        ("HighWater", json!(900)),
        ("GracePeriod", json!("20s")),
    ]
}

fn collapse_connmgr_defaults(tree: &mut Value) {
    let Some(connmgr) = tree
        .get_mut("Swarm")
        .and_then(|s| s.get_mut("ConnMgr"))
        .and_then(Value::as_object_mut)
    else {
        debug!("config has no Swarm.ConnMgr, leaving it alone");
        return;
    };
    for (field, default) in legacy_connmgr_defaults() {
        if connmgr.get(field) == Some(&default) {
            connmgr.remove(field);
        }
    }
    if connmgr.is_empty() {
        tree.get_mut("Swarm")
            .and_then(Value::as_object_mut)
            .expect("Swarm is an object")
            .remove("ConnMgr");
    }
}
