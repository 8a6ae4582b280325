use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;
use std::str::FromStr;

use crate::types::ObjectKind;
use crate::Error;

/// SHA-1 object id used for content addressing
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Oid([u8; 20]);

impl Oid {
    /// raw digest length in bytes
    pub const LEN: usize = 20;

    /// zero id (useful as sentinel)
    pub const ZERO: Oid = Oid([0u8; 20]);

    /// create from raw bytes
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// create from a slice that must be exactly 20 bytes
    pub fn from_slice(bytes: &[u8]) -> crate::Result<Self> {
        let arr: [u8; 20] = bytes
            .try_into()
            .map_err(|_| Error::InvalidHashHex(hex::encode(bytes)))?;
        Ok(Self(arr))
    }

    /// parse from hex string
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        let bytes = hex::decode(s).map_err(|_| Error::InvalidHashHex(s.to_string()))?;
        if bytes.len() != Self::LEN {
            return Err(Error::InvalidHashHex(s.to_string()));
        }
        let mut arr = [0u8; 20];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// does this string have the shape of a full hex id
    pub fn looks_like_hex(s: &str) -> bool {
        s.len() == Self::LEN * 2 && s.bytes().all(|b| b.is_ascii_hexdigit())
    }

    /// get raw bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// convert to lowercase hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// split into loose object path components
    /// returns (first 2 hex chars, remaining 38 hex chars)
    pub fn to_path_components(&self) -> (String, String) {
        let hex = self.to_hex();
        (hex[..2].to_string(), hex[2..].to_string())
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({})", &self.to_hex()[..12])
    }
}

impl FromStr for Oid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Oid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Oid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// encode the object header: `<kind> <len>\0`
pub fn object_header(kind: ObjectKind, len: usize) -> Vec<u8> {
    format!("{} {}\0", kind, len).into_bytes()
}

/// compute the id of an object from its kind and body
///
/// the digest covers the header followed by the body, so the same bytes
/// stored as a blob and as a tree get different ids.
pub fn compute_object_hash(kind: ObjectKind, body: &[u8]) -> Oid {
    let mut hasher = ObjectHasher::new(kind, body.len());
    hasher.update(body);
    hasher.finalize()
}

/// streaming object hasher for bodies that arrive in pieces
pub struct ObjectHasher {
    hasher: Sha1,
}

impl ObjectHasher {
    /// create new hasher, writing the header immediately
    pub fn new(kind: ObjectKind, len: usize) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(object_header(kind, len));
        Self { hasher }
    }

    /// feed body bytes
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// finalize and return the id
    pub fn finalize(self) -> Oid {
        Oid(self.hasher.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oid_hex_roundtrip() {
        let original = Oid::from_hex("ce013625030ba8dba906f756967f9e9ca394464a").unwrap();
        let parsed: Oid = original.to_hex().parse().unwrap();
        assert_eq!(original, parsed);
        assert_eq!(original.to_string().len(), 40);
    }

    #[test]
    fn test_oid_invalid_hex() {
        assert!(Oid::from_hex("not valid hex").is_err());
        assert!(Oid::from_hex("abcd").is_err());
        assert!(Oid::from_hex("ce013625030ba8dba906f756967f9e9ca394464aff").is_err());
    }

    #[test]
    fn test_oid_from_slice() {
        let oid = Oid::from_slice(&[7u8; 20]).unwrap();
        assert_eq!(oid.as_bytes(), &[7u8; 20]);
        assert!(Oid::from_slice(&[7u8; 19]).is_err());
    }

    #[test]
    fn test_looks_like_hex() {
        assert!(Oid::looks_like_hex("e69de29bb2d1d6434b8b29ae775ad8c2e48c5391"));
        assert!(!Oid::looks_like_hex("master"));
        assert!(!Oid::looks_like_hex("e69de29bb2d1d6434b8b29ae775ad8c2e48c539"));
    }

    #[test]
    fn test_path_components() {
        let oid = Oid::from_hex("ce013625030ba8dba906f756967f9e9ca394464a").unwrap();
        let (dir, file) = oid.to_path_components();
        assert_eq!(dir, "ce");
        assert_eq!(file, "013625030ba8dba906f756967f9e9ca394464a");
    }

    #[test]
    fn test_known_blob_hashes() {
        // git hash-object --stdin <<< hello
        let hello = compute_object_hash(ObjectKind::Blob, b"hello\n");
        assert_eq!(hello.to_hex(), "ce013625030ba8dba906f756967f9e9ca394464a");

        // git hash-object -t blob /dev/null
        let empty = compute_object_hash(ObjectKind::Blob, b"");
        assert_eq!(empty.to_hex(), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
    }

    #[test]
    fn test_known_empty_tree_hash() {
        let empty = compute_object_hash(ObjectKind::Tree, b"");
        assert_eq!(empty.to_hex(), "4b825dc642cb6eb9a060e54bf8d69288fbee4904");
    }

    #[test]
    fn test_kind_changes_hash() {
        let blob = compute_object_hash(ObjectKind::Blob, b"same");
        let tree = compute_object_hash(ObjectKind::Tree, b"same");
        assert_ne!(blob, tree);
    }

    #[test]
    fn test_streaming_hasher() {
        let direct = compute_object_hash(ObjectKind::Blob, b"helloworld");

        let mut streaming = ObjectHasher::new(ObjectKind::Blob, 10);
        streaming.update(b"hello");
        streaming.update(b"world");

        assert_eq!(direct, streaming.finalize());
    }

    #[test]
    fn test_oid_serde_json() {
        let oid = Oid::from_hex("ce013625030ba8dba906f756967f9e9ca394464a").unwrap();
        let json = serde_json::to_string(&oid).unwrap();
        assert_eq!(json, "\"ce013625030ba8dba906f756967f9e9ca394464a\"");
        let parsed: Oid = serde_json::from_str(&json).unwrap();
        assert_eq!(oid, parsed);
    }
}
