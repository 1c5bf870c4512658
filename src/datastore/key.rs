// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::fmt;

use cid::Cid;
use data_encoding::BASE32_NOPAD;

use crate::error::Error;

/// A slash-delimited datastore key, e.g. `/blocks/CIQ…`.
///
/// Keys are kept in canonical form: they always start with `/`, never end
/// with one (except the root key `/`), and contain no empty components.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DsKey(String);

impl DsKey {
    pub fn new(s: &str) -> Self {
        let mut out = String::with_capacity(s.len() + 1);
        for part in s.split('/').filter(|p| !p.is_empty()) {
            out.push('/');
            out.push_str(part);
        }
        if out.is_empty() {
            out.push('/');
        }
        Self(out)
    }

    pub fn root() -> Self {
        Self("/".to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Last path component; empty for the root key.
    pub fn base_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or("")
    }

    pub fn parent(&self) -> DsKey {
        match self.0.rfind('/') {
            Some(0) | None => DsKey::root(),
            Some(idx) => DsKey(self.0[..idx].to_owned()),
        }
    }

    pub fn child(&self, name: &str) -> DsKey {
        if self.is_root() {
            DsKey::new(name)
        } else {
            DsKey::new(&format!("{}/{name}", self.0))
        }
    }

    /// True when `self` equals `prefix` or lives under it.
    pub fn is_under(&self, prefix: &DsKey) -> bool {
        if prefix.is_root() {
            return true;
        }
        self.0 == prefix.0
            || (self.0.starts_with(&prefix.0) && self.0.as_bytes()[prefix.0.len()] == b'/')
    }

    /// Removes a leading `prefix`, yielding the remainder as a key. Returns
    /// `None` when `self` is not under `prefix`.
    pub fn strip_prefix(&self, prefix: &DsKey) -> Option<DsKey> {
        if !self.is_under(prefix) {
            return None;
        }
        if prefix.is_root() {
            return Some(self.clone());
        }
        Some(DsKey::new(&self.0[prefix.0.len()..]))
    }

    /// Prepends `prefix`, the inverse of [`DsKey::strip_prefix`].
    pub fn with_prefix(&self, prefix: &DsKey) -> DsKey {
        if prefix.is_root() {
            self.clone()
        } else if self.is_root() {
            prefix.clone()
        } else {
            DsKey(format!("{}{}", prefix.0, self.0))
        }
    }
}

impl fmt::Display for DsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for DsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DsKey({})", self.0)
    }
}

impl std::str::FromStr for DsKey {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(DsKey::new(s))
    }
}

/// Encodes a binary name (CID or multihash bytes) the way block keys are
/// spelled on disk: uppercase RFC 4648 base-32, no padding.
pub fn encode_binary_name(bytes: &[u8]) -> String {
    BASE32_NOPAD.encode(bytes)
}

/// Inverse of [`encode_binary_name`]; lowercase input is accepted.
pub fn decode_binary_name(name: &str) -> Result<Vec<u8>, Error> {
    BASE32_NOPAD
        .decode(name.to_ascii_uppercase().as_bytes())
        .map_err(|_| Error::Corrupt(format!("{name:?} is not base-32")))
}

/// The key under `prefix` addressing `cid` by its full binary form.
pub fn cid_key(prefix: &DsKey, cid: &Cid) -> DsKey {
    prefix.child(&encode_binary_name(&cid.to_bytes()))
}

/// The key under `prefix` addressing `cid` by its raw multihash. For CIDv0
/// this coincides with [`cid_key`], since the CID bytes are the multihash.
pub fn multihash_key(prefix: &DsKey, cid: &Cid) -> DsKey {
    prefix.child(&encode_binary_name(&cid.hash().to_bytes()))
}

/// Decodes a key's base name as a CID, if it is one.
pub fn parse_cid_name(name: &str) -> Result<Cid, Error> {
    let bytes = decode_binary_name(name)?;
    Cid::try_from(bytes.as_slice())
        .map_err(|e| Error::Corrupt(format!("{name:?} is not a CID: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cid::Version;
    use multihash_codetable::{Code, MultihashDigest};
    use quickcheck_macros::quickcheck;

    const RAW: u64 = 0x55;
    const DAG_PB: u64 = 0x70;

    #[test]
    fn keys_are_canonicalized() {
        assert_eq!(DsKey::new("blocks").as_str(), "/blocks");
        assert_eq!(DsKey::new("/blocks/").as_str(), "/blocks");
        assert_eq!(DsKey::new("//a//b/").as_str(), "/a/b");
        assert_eq!(DsKey::new("").as_str(), "/");
    }

    #[test]
    fn navigation() {
        let key = DsKey::new("/blocks/CIQABC");
        assert_eq!(key.base_name(), "CIQABC");
        assert_eq!(key.parent(), DsKey::new("/blocks"));
        assert_eq!(DsKey::new("/blocks").child("X"), DsKey::new("/blocks/X"));
        assert!(key.is_under(&DsKey::new("/blocks")));
        assert!(!key.is_under(&DsKey::new("/block")));
        assert_eq!(
            key.strip_prefix(&DsKey::new("/blocks")).unwrap(),
            DsKey::new("/CIQABC")
        );
        assert_eq!(
            DsKey::new("/CIQABC").with_prefix(&DsKey::new("/blocks")),
            key
        );
    }

    #[quickcheck]
    fn binary_name_round_trips(bytes: Vec<u8>) -> bool {
        decode_binary_name(&encode_binary_name(&bytes)).unwrap() == bytes
    }

    #[test]
    fn v0_cid_and_multihash_keys_coincide() {
        let mh = Code::Sha2_256.digest(b"same bytes either way");
        let v0 = Cid::new_v0(mh).unwrap();
        let prefix = DsKey::new("/blocks");
        assert_eq!(cid_key(&prefix, &v0), multihash_key(&prefix, &v0));
    }

    #[test]
    fn v1_cid_and_multihash_keys_differ() {
        let mh = Code::Sha2_256.digest(b"block");
        let v1 = Cid::new_v1(RAW, mh);
        let prefix = DsKey::new("/blocks");
        let cid_shaped = cid_key(&prefix, &v1);
        let mh_shaped = multihash_key(&prefix, &v1);
        assert_ne!(cid_shaped, mh_shaped);

        let parsed = parse_cid_name(cid_shaped.base_name()).unwrap();
        assert_eq!(parsed, v1);
        assert_eq!(parsed.version(), Version::V1);
    }

    #[test]
    fn multihash_name_is_not_a_valid_v1_cid() {
        // a raw sha2-256 multihash starts with 0x12, which parses as CIDv0,
        // never as CIDv1, which is why the forward pass can skip it
        let mh = Code::Sha2_256.digest(b"block");
        let v1 = Cid::new_v1(DAG_PB, mh);
        let name_key = multihash_key(&DsKey::new("/blocks"), &v1);
        let reparsed = parse_cid_name(name_key.base_name()).unwrap();
        assert_eq!(reparsed.version(), Version::V0);
    }
}
