// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! 6-to-7: collapses router and reprovider settings back to implicit
//! defaults. A field is removed only when it stores exactly the legacy
//! default value; hand-edited values survive.

use serde_json::{json, Value};
use tracing::debug;

use super::{MigrationStep, Options};

pub(super) struct Migration6_7;

impl MigrationStep for Migration6_7 {
    fn versions(&self) -> &str {
        "6-to-7"
    }

    fn reversible(&self) -> bool {
        true
    }

    fn apply(&self, opts: &Options) -> anyhow::Result<()> {
        super::apply_config_step(opts, 6, 7, |tree| {
            collapse_routing_defaults(tree);
            collapse_reprovider_defaults(tree);
            Ok(())
        })
    }

    fn revert(&self, opts: &Options) -> anyhow::Result<()> {
        super::revert_config_step(opts, 6, 7)
    }
}

/// Removes `section.field` when it equals `default`; drops the section
/// object once it is empty.
fn collapse_field(tree: &mut Value, section: &str, field: &str, default: &Value) {
    let Some(obj) = tree.get_mut(section).and_then(Value::as_object_mut) else {
        debug!("config has no {section} section, leaving it alone");
        return;
    };
    if obj.get(field) == Some(default) {
        obj.remove(field);
    }
    if obj.is_empty() {
        tree.as_object_mut().expect("root is an object").remove(section);
    }
}

fn collapse_routing_defaults(tree: &mut Value) {
    collapse_field(tree, "Routing", "Type", &json!("dht"));
}

fn collapse_reprovider_defaults(tree: &mut Value) {
    collapse_field(tree, "Reprovider", "Interval", &json!("12h"));
    collapse_field(tree, "Reprovider", "Strategy", &json!("all"));
}
