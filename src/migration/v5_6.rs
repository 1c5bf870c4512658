// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! 5-to-6: drops obsolete gateway headers, but only where they still carry
//! the exact legacy default. Anything the operator customised stays.

use serde_json::{json, Value};
use tracing::debug;

use super::{MigrationStep, Options};

pub(super) struct Migration5_6;

impl MigrationStep for Migration5_6 {
    fn versions(&self) -> &str {
        "5-to-6"
    }

    fn reversible(&self) -> bool {
        true
    }

    fn apply(&self, opts: &Options) -> anyhow::Result<()> {
        super::apply_config_step(opts, 5, 6, |tree| {
            strip_default_gateway_headers(tree);
            Ok(())
        })
    }

    fn revert(&self, opts: &Options) -> anyhow::Result<()> {
        super::revert_config_step(opts, 5, 6)
    }
}

fn legacy_default_headers() -> Vec<(&'static str, Value)> {
    vec![
        ("Access-Control-Allow-Origin", json!(["*"])),
        ("Access-Control-Allow-Methods", json!(["GET"])),
        (
            "Access-Control-Allow-Headers",
            json!(["X-Requested-With", "Range", "User-Agent"]),
        ),
    ]
}

fn strip_default_gateway_headers(tree: &mut Value) {
    let Some(headers) = tree
        .get_mut("Gateway")
        .and_then(|g| g.get_mut("HTTPHeaders"))
        .and_then(Value::as_object_mut)
    else {
        debug!("config has no Gateway.HTTPHeaders, leaving it alone");
        return;
    };
    for (name, default) in legacy_default_headers() {
        if headers.get(name) == Some(&default) {
            headers.remove(name);
        }
    }
}
