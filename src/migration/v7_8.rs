// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! 7-to-8: adds a QUIC listener next to every TCP swarm/announce address.
//! Existing entries are kept; nothing is added twice.

use serde_json::Value;
use tracing::debug;

use super::{MigrationStep, Options};

pub(super) struct Migration7_8;

impl MigrationStep for Migration7_8 {
    fn versions(&self) -> &str {
        "7-to-8"
    }

    fn reversible(&self) -> bool {
        true
    }

    fn apply(&self, opts: &Options) -> anyhow::Result<()> {
        super::apply_config_step(opts, 7, 8, |tree| {
            for list in ["Swarm", "Announce"] {
                add_quic_addresses(tree, list);
            }
            Ok(())
        })
    }

    fn revert(&self, opts: &Options) -> anyhow::Result<()> {
        super::revert_config_step(opts, 7, 8)
    }
}

/// `/ip4/x/tcp/p` begets `/ip4/x/udp/p/quic`; anything else passes through.
fn quic_for_tcp(addr: &str) -> Option<String> {
    let (host, port) = addr.rsplit_once("/tcp/")?;
    if port.contains('/') {
        // tcp is not the terminal protocol, e.g. a ws address
        return None;
    }
    Some(format!("{host}/udp/{port}/quic"))
}

fn add_quic_addresses(tree: &mut Value, list: &str) {
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
        .filter_map(quic_for_tcp)
        .filter(|quic| !addrs.iter().any(|a| a.as_str() == Some(quic)))
        .collect();
    addrs.extend(additions.into_iter().map(Value::String));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::test_fixtures::{config_repo, read_config};
    use serde_json::json;

    #[test]
    fn derives_quic_from_tcp() {
        assert_eq!(
            quic_for_tcp("/ip4/0.0.0.0/tcp/4001").as_deref(),
            Some("/ip4/0.0.0.0/udp/4001/quic")
        );
        assert_eq!(
            quic_for_tcp("/ip6/::/tcp/4001").as_deref(),
            Some("/ip6/::/udp/4001/quic")
        );
        assert_eq!(quic_for_tcp("/ip4/0.0.0.0/tcp/8081/ws"), None);
        assert_eq!(quic_for_tcp("/ip4/0.0.0.0/udp/4001/quic"), None);
    }

    #[test]
    fn adds_without_duplicating() {
        let dir = config_repo(
            7,
            &json!({
                "Addresses": {
                    "Swarm": [
                        "/ip4/0.0.0.0/tcp/4001",
                        "/ip4/0.0.0.0/udp/4001/quic"
                    ]
                }
            }),
        );
        Migration7_8.apply(&Options::new(dir.path())).unwrap();

        let swarm = read_config(dir.path())["Addresses"]["Swarm"].clone();
        assert_eq!(
            swarm,
            json!(["/ip4/0.0.0.0/tcp/4001", "/ip4/0.0.0.0/udp/4001/quic"])
        );
    }

    #[test]
    fn adds_quic_listener() {
        let dir = config_repo(
            7,
            &json!({"Addresses": {"Swarm": ["/ip6/::/tcp/4001"]}}),
        );
        Migration7_8.apply(&Options::new(dir.path())).unwrap();

        let swarm = read_config(dir.path())["Addresses"]["Swarm"].clone();
        assert_eq!(swarm, json!(["/ip6/::/tcp/4001", "/ip6/::/udp/4001/quic"]));
    }
}
