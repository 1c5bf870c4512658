// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! 8-to-9: the accelerated DHT client graduates out of `Experimental` into
//! the `Routing` section.

use serde_json::{Map, Value};
use tracing::debug;

use super::{MigrationStep, Options};

const FLAG: &str = "AcceleratedDHTClient";

pub(super) struct Migration8_9;

impl MigrationStep for Migration8_9 {
    fn versions(&self) -> &str {
        "8-to-9"
    }

    fn reversible(&self) -> bool {
        true
    }

    fn apply(&self, opts: &Options) -> anyhow::Result<()> {
        super::apply_config_step(opts, 8, 9, |tree| {
            move_accelerated_dht_flag(tree);
            Ok(())
        })
    }

    fn revert(&self, opts: &Options) -> anyhow::Result<()> {
        super::revert_config_step(opts, 8, 9)
    }
}

fn move_accelerated_dht_flag(tree: &mut Value) {
    let Some(flag) = tree
        .get_mut("Experimental")
        .and_then(Value::as_object_mut)
        .and_then(|exp| exp.remove(FLAG))
    else {
        debug!("config has no Experimental.{FLAG}, leaving it alone");
        return;
    };
    let root = tree.as_object_mut().expect("root is an object");
    root.entry("Routing")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .expect("Routing is an object")
        .insert(FLAG.to_owned(), flag);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::test_fixtures::{config_repo, read_config};
    use serde_json::json;

    #[test]
    fn moves_flag_into_routing() {
        let dir = config_repo(
            8,
            &json!({
                "Experimental": {"AcceleratedDHTClient": true, "FilestoreEnabled": false},
                "Routing": {"Type": "dhtclient"}
            }),
        );
        Migration8_9.apply(&Options::new(dir.path())).unwrap();

        let tree = read_config(dir.path());
        assert_eq!(tree["Routing"][FLAG], true);
        assert_eq!(tree["Routing"]["Type"], "dhtclient");
        assert!(tree["Experimental"].get(FLAG).is_none());
        assert_eq!(tree["Experimental"]["FilestoreEnabled"], false);
    }

    #[test]
    fn creates_routing_section_when_missing() {
        let dir = config_repo(8, &json!({"Experimental": {FLAG: false}}));
        Migration8_9.apply(&Options::new(dir.path())).unwrap();
        assert_eq!(read_config(dir.path())["Routing"][FLAG], false);
    }

    #[test]
    fn absent_flag_changes_nothing() {
        let config = json!({"Experimental": {}});
        let dir = config_repo(8, &config);
        Migration8_9.apply(&Options::new(dir.path())).unwrap();
        assert_eq!(read_config(dir.path()), config);
    }
}
