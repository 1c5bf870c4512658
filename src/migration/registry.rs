// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The registry of compiled-in migration steps and the runner that walks
//! them. Versions are a linear sequence of integers, so the chain from V to T
//! is simply every adjacent step in the direction of travel.

use std::{
    collections::BTreeMap,
    sync::{Arc, LazyLock},
};

use anyhow::{bail, Context as _};
use tracing::info;

use super::{MigrationStep, Options};

pub type Step = Arc<dyn MigrationStep>;
type StepsMap = BTreeMap<u32, Step>;

/// A utility macro to make the step declarations easier to read.
/// The usage is: `<FROM version> -> <TO version> @ <step object>`
macro_rules! register_migrations {
    ($($from:literal -> $to:literal @ $step:expr),* $(,)?) => {
        static MIGRATIONS: LazyLock<StepsMap> = LazyLock::new(|| {
            StepsMap::from_iter([
                $((
                    {
                        const _: () = assert!($to == $from + 1, "steps must be adjacent");
                        $from
                    },
                    Arc::new($step) as Step,
                )),*
            ])
        });
    };
}

register_migrations!(
    0 -> 1 @ super::v0_1::Migration0_1,
    1 -> 2 @ super::v1_2::Migration1_2,
    2 -> 3 @ super::v2_3::Migration2_3,
    3 -> 4 @ super::v3_4::Migration3_4,
    4 -> 5 @ super::v4_5::Migration4_5,
    5 -> 6 @ super::v5_6::Migration5_6,
    6 -> 7 @ super::v6_7::Migration6_7,
    7 -> 8 @ super::v7_8::Migration7_8,
    8 -> 9 @ super::v8_9::Migration8_9,
    9 -> 10 @ super::v9_10::Migration9_10,
    10 -> 11 @ super::v10_11::Migration10_11,
    11 -> 12 @ super::v11_12::Migration11_12,
    12 -> 13 @ super::v12_13::Migration12_13,
);

/// The highest repository version this binary can produce.
pub fn latest_version() -> u32 {
    *MIGRATIONS.keys().next_back().expect("registry is not empty") + 1
}

/// The step whose source version is `from`.
pub fn find_step(from: u32) -> Option<Step> {
    MIGRATIONS.get(&from).cloned()
}

/// Either direction of travel along the version sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

/// Resolves the chain of steps from `from` to `to`, in execution order.
/// An empty chain means the repository is already at the target.
pub fn build_chain(from: u32, to: u32, revert_ok: bool) -> anyhow::Result<Vec<(Step, Direction)>> {
    build_chain_from(&MIGRATIONS, from, to, revert_ok)
}

fn build_chain_from(
    migrations: &StepsMap,
    from: u32,
    to: u32,
    revert_ok: bool,
) -> anyhow::Result<Vec<(Step, Direction)>> {
    if from == to {
        return Ok(Vec::new());
    }
    if to < from {
        if !revert_ok {
            bail!(
                "target version {to} is below the current version {from}; \
                 pass --revert-ok to migrate backwards"
            );
        }
        return (to..from)
            .rev()
            .map(|v| {
                let step = migrations
                    .get(&v)
                    .with_context(|| format!("no migration for versions {v}-to-{}", v + 1))?;
                if !step.reversible() {
                    bail!("migration {} is not reversible", step.versions());
                }
                Ok((step.clone(), Direction::Reverse))
            })
            .collect();
    }
    (from..to)
        .map(|v| {
            let step = migrations
                .get(&v)
                .with_context(|| format!("no migration for versions {v}-to-{}", v + 1))?;
            Ok((step.clone(), Direction::Forward))
        })
        .collect()
}

/// Runs the resolved chain, propagating the first error without attempting
/// any rollback across steps.
pub fn run(opts: &Options, from: u32, to: u32) -> anyhow::Result<()> {
    let chain = build_chain(from, to, opts.revert_ok)?;
    if chain.is_empty() {
        info!("repository is already at version {to}, nothing to do");
        return Ok(());
    }
    for (step, direction) in chain {
        match direction {
            Direction::Forward => {
                info!("applying migration {}", step.versions());
                step.apply(opts)
                    .with_context(|| format!("migration {} failed", step.versions()))?;
            }
            Direction::Reverse => {
                info!("reverting migration {}", step.versions());
                step.revert(opts)
                    .with_context(|| format!("revert of {} failed", step.versions()))?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DummyStep {
        label: String,
        reversible: bool,
    }

    impl MigrationStep for DummyStep {
        fn versions(&self) -> &str {
            &self.label
        }

        fn reversible(&self) -> bool {
            self.reversible
        }

        fn apply(&self, _opts: &Options) -> anyhow::Result<()> {
            Ok(())
        }

        fn revert(&self, _opts: &Options) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn dummy_map(reversible: bool) -> StepsMap {
        (0..4)
            .map(|v| {
                (
                    v,
                    Arc::new(DummyStep {
                        label: format!("{v}-to-{}", v + 1),
                        reversible,
                    }) as Step,
                )
            })
            .collect()
    }

    #[test]
    fn equal_versions_short_circuit() {
        let chain = build_chain_from(&dummy_map(true), 2, 2, false).unwrap();
        assert!(chain.is_empty());
    }

    #[test]
    fn forward_chain_is_every_adjacent_step() {
        let chain = build_chain_from(&dummy_map(true), 1, 4, false).unwrap();
        let labels: Vec<_> = chain.iter().map(|(s, _)| s.versions().to_owned()).collect();
        assert_eq!(labels, vec!["1-to-2", "2-to-3", "3-to-4"]);
        assert!(chain.iter().all(|(_, d)| *d == Direction::Forward));
    }

    #[test]
    fn reverse_chain_requires_revert_ok() {
        let err = build_chain_from(&dummy_map(true), 3, 1, false).unwrap_err();
        assert!(err.to_string().contains("--revert-ok"));

        let chain = build_chain_from(&dummy_map(true), 3, 1, true).unwrap();
        let labels: Vec<_> = chain.iter().map(|(s, _)| s.versions().to_owned()).collect();
        assert_eq!(labels, vec!["2-to-3", "1-to-2"]);
        assert!(chain.iter().all(|(_, d)| *d == Direction::Reverse));
    }

    #[test]
    fn irreversible_step_refuses_reverse() {
        let err = build_chain_from(&dummy_map(false), 3, 1, true).unwrap_err();
        assert!(err.to_string().contains("not reversible"));
    }

    #[test]
    fn missing_step_is_an_error() {
        let err = build_chain_from(&dummy_map(true), 2, 6, false).unwrap_err();
        assert!(err.to_string().contains("no migration"));
    }

    #[test]
    fn registry_covers_every_version_up_to_latest() {
        let latest = latest_version();
        for v in 0..latest {
            let step = find_step(v).unwrap_or_else(|| panic!("no step from version {v}"));
            assert_eq!(step.versions(), format!("{v}-to-{}", v + 1));
        }
        assert!(find_step(latest).is_none());
    }
}
