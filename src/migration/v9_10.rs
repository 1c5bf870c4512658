// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! 9-to-10: keystore file names become `key_<base-32 of the logical name>`,
//! lowercase and unpadded, so arbitrary key names stop colliding with
//! filesystem restrictions. The revert decodes the names back exactly.

use std::path::Path;

use data_encoding::BASE32_NOPAD;
use tracing::{info, warn};

use super::{MigrationStep, Options};
use crate::repo::{check_version, write_version, RepoLock, KEYSTORE_DIR};

const KEY_PREFIX: &str = "key_";

pub(super) struct Migration9_10;

impl MigrationStep for Migration9_10 {
    fn versions(&self) -> &str {
        "9-to-10"
    }

    fn reversible(&self) -> bool {
        true
    }

    fn apply(&self, opts: &Options) -> anyhow::Result<()> {
        let _lock = RepoLock::lock(&opts.repo)?;
        check_version(&opts.repo, 9)?;

        rename_all(&opts.repo.join(KEYSTORE_DIR), encode_name)?;

        write_version(&opts.repo, 10)?;
        info!("repository migrated to version 10");
        Ok(())
    }

    fn revert(&self, opts: &Options) -> anyhow::Result<()> {
        let _lock = RepoLock::lock(&opts.repo)?;
        check_version(&opts.repo, 10)?;

        rename_all(&opts.repo.join(KEYSTORE_DIR), decode_name)?;

        write_version(&opts.repo, 9)?;
        info!("repository reverted to version 9");
        Ok(())
    }
}

pub(super) fn encode_name(name: &str) -> Option<String> {
    if name.starts_with(KEY_PREFIX) {
        warn!("keystore entry {name:?} already looks encoded, skipping");
        return None;
    }
    Some(format!(
        "{KEY_PREFIX}{}",
        BASE32_NOPAD.encode(name.as_bytes()).to_ascii_lowercase()
    ))
}

pub(super) fn decode_name(name: &str) -> Option<String> {
    let Some(encoded) = name.strip_prefix(KEY_PREFIX) else {
        warn!("keystore entry {name:?} has no {KEY_PREFIX} prefix, skipping");
        return None;
    };
    let bytes = BASE32_NOPAD
        .decode(encoded.to_ascii_uppercase().as_bytes())
        .ok()?;
    match String::from_utf8(bytes) {
        Ok(decoded) => Some(decoded),
        Err(_) => {
            warn!("keystore entry {name:?} does not decode to UTF-8, skipping");
            None
        }
    }
}

fn rename_all(keystore: &Path, rename: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
    if !keystore.is_dir() {
        info!("no keystore directory, nothing to rename");
        return Ok(());
    }
    for entry in std::fs::read_dir(keystore)? {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            warn!("keystore entry with non-UTF-8 name, skipping");
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        if let Some(new_name) = rename(&name) {
            std::fs::rename(entry.path(), keystore.join(&new_name))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::{read_version, write_version};

    #[test]
    fn encodes_known_names() {
        // "self" is the fixture everyone knows the encoding of
        assert_eq!(encode_name("self").as_deref(), Some("key_onswyzq"));
        assert_eq!(encode_name("mykey").as_deref(), Some("key_nv4wwzlz"));
        assert_eq!(decode_name("key_onswyzq").as_deref(), Some("self"));
    }

    #[test]
    fn decode_is_inverse_of_encode() {
        for name in ["self", "mykey", "with spaces", "ünïcode"] {
            let encoded = encode_name(name).unwrap();
            assert_eq!(decode_name(&encoded).as_deref(), Some(name));
        }
    }

    #[test]
    fn already_encoded_names_are_skipped() {
        assert_eq!(encode_name("key_onswyzq"), None);
        assert_eq!(decode_name("self"), None);
        assert_eq!(decode_name("key_!!!"), None);
    }

    #[test]
    fn keystore_round_trips_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        write_version(dir.path(), 9).unwrap();
        let keystore = dir.path().join(KEYSTORE_DIR);
        std::fs::create_dir(&keystore).unwrap();
        std::fs::write(keystore.join("self"), b"private-self").unwrap();
        std::fs::write(keystore.join("mykey"), b"private-mykey").unwrap();

        let opts = Options::new(dir.path());
        Migration9_10.apply(&opts).unwrap();

        assert_eq!(
            std::fs::read(keystore.join("key_onswyzq")).unwrap(),
            b"private-self"
        );
        assert_eq!(
            std::fs::read(keystore.join("key_nv4wwzlz")).unwrap(),
            b"private-mykey"
        );
        assert!(!keystore.join("self").exists());
        assert_eq!(read_version(dir.path()).unwrap(), 10);

        Migration9_10.revert(&opts).unwrap();
        assert_eq!(std::fs::read(keystore.join("self")).unwrap(), b"private-self");
        assert_eq!(std::fs::read(keystore.join("mykey")).unwrap(), b"private-mykey");
        assert_eq!(read_version(dir.path()).unwrap(), 9);
    }

    #[test]
    fn missing_keystore_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        write_version(dir.path(), 9).unwrap();
        Migration9_10.apply(&Options::new(dir.path())).unwrap();
        assert_eq!(read_version(dir.path()).unwrap(), 10);
    }
}
