// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! 11-to-12: introduces `Addresses.AppendAnnounce` so operators can extend
//! the announce list without replacing it wholesale.

use serde_json::{json, Value};
use tracing::debug;

use super::{MigrationStep, Options};

pub(super) struct Migration11_12;

impl MigrationStep for Migration11_12 {
    fn versions(&self) -> &str {
        "11-to-12"
    }

    fn reversible(&self) -> bool {
        true
    }

    fn apply(&self, opts: &Options) -> anyhow::Result<()> {
        super::apply_config_step(opts, 11, 12, |tree| {
            add_append_announce(tree);
            Ok(())
        })
    }

    fn revert(&self, opts: &Options) -> anyhow::Result<()> {
        super::revert_config_step(opts, 11, 12)
    }
}

fn add_append_announce(tree: &mut Value) {
    let Some(addresses) = tree.get_mut("Addresses").and_then(Value::as_object_mut) else {
        debug!("config has no Addresses section, leaving it alone");
        return;
    };
    addresses
        .entry("AppendAnnounce")
        .or_insert_with(|| json!([]));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::test_fixtures::{config_repo, read_config};
    use serde_json::json;

    #[test]
    fn inserts_empty_append_announce() {
        let dir = config_repo(11, &json!({"Addresses": {"Swarm": []}}));
        Migration11_12.apply(&Options::new(dir.path())).unwrap();
        assert_eq!(read_config(dir.path())["Addresses"]["AppendAnnounce"], json!([]));
    }

    #[test]
    fn existing_value_is_preserved() {
        let config = json!({"Addresses": {"AppendAnnounce": ["/dns4/x/tcp/4001"]}});
        let dir = config_repo(11, &config);
        Migration11_12.apply(&Options::new(dir.path())).unwrap();
        assert_eq!(read_config(dir.path()), config);
    }
}
