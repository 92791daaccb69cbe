//! Object identifier (SHA-1 hash)
//!
//! Object ids are 40-character lowercase hexadecimal strings. They name every
//! object in the store and are what references point at.
//!
//! ## Storage
//!
//! Objects live in `.gitc/objects/<first-2-chars>/<remaining-38-chars>`.

use crate::artifacts::objects::{OBJECT_ID_BYTES, OBJECT_ID_LENGTH};
use sha1::{Digest, Sha1};
use std::io;
use std::path::PathBuf;

/// Object identifier (SHA-1 hash in hex form)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ObjectId(String);

impl ObjectId {
    /// Parse and validate an object id, normalising it to lowercase
    pub fn try_parse(id: String) -> anyhow::Result<Self> {
        if id.len() != OBJECT_ID_LENGTH {
            anyhow::bail!("invalid object id length: {}", id.len());
        }
        if !id.chars().all(|c| c.is_ascii_hexdigit()) {
            anyhow::bail!("invalid object id characters: {}", id);
        }
        Ok(Self(id.to_ascii_lowercase()))
    }

    /// Hash a canonical object serialization
    pub fn hash_of(canonical: &[u8]) -> Self {
        let digest = Sha1::digest(canonical);
        Self(hex::encode(digest))
    }

    /// The all-zero id used on the wire for "no object"
    pub fn zero() -> Self {
        Self("0".repeat(OBJECT_ID_LENGTH))
    }

    pub fn is_zero(&self) -> bool {
        self.0.bytes().all(|b| b == b'0')
    }

    pub fn from_raw(raw: &[u8]) -> anyhow::Result<Self> {
        if raw.len() != OBJECT_ID_BYTES {
            anyhow::bail!("invalid raw object id length: {}", raw.len());
        }
        Ok(Self(hex::encode(raw)))
    }

    pub fn to_raw(&self) -> anyhow::Result<[u8; OBJECT_ID_BYTES]> {
        let mut raw = [0u8; OBJECT_ID_BYTES];
        hex::decode_to_slice(&self.0, &mut raw)?;
        Ok(raw)
    }

    /// Write the id in binary form (20 bytes), as used inside tree objects
    pub fn write_raw_to<W: io::Write>(&self, writer: &mut W) -> anyhow::Result<()> {
        writer.write_all(&self.to_raw()?)?;
        Ok(())
    }

    /// Read a binary id (20 bytes)
    pub fn read_raw_from<R: io::Read + ?Sized>(reader: &mut R) -> anyhow::Result<Self> {
        let mut raw = [0u8; OBJECT_ID_BYTES];
        reader.read_exact(&mut raw)?;
        Self::from_raw(&raw)
    }

    /// Split the hash as `XX/YYYY...` for the loose object layout
    pub fn to_path(&self) -> PathBuf {
        let (dir, file) = self.0.split_at(2);
        PathBuf::from(dir).join(file)
    }

    pub fn to_short_oid(&self) -> String {
        self.0.split_at(7).0.to_string()
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ObjectId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Self::try_parse(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::proptest;

    #[test]
    fn hash_of_matches_known_empty_blob_digest() {
        let oid = ObjectId::hash_of(b"blob 0\0");
        assert_eq!(oid.as_ref(), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
    }

    #[test]
    fn rejects_short_and_non_hex_ids() {
        assert!(ObjectId::try_parse("abc".to_string()).is_err());
        assert!(ObjectId::try_parse("z".repeat(40)).is_err());
    }

    #[test]
    fn zero_id_is_recognised() {
        assert!(ObjectId::zero().is_zero());
        assert!(!ObjectId::hash_of(b"x").is_zero());
    }

    proptest! {
        #[test]
        fn raw_form_preserves_the_id(raw in proptest::array::uniform20(proptest::num::u8::ANY)) {
            let oid = ObjectId::from_raw(&raw).unwrap();
            let mut buffer = Vec::new();
            oid.write_raw_to(&mut buffer).unwrap();
            assert_eq!(ObjectId::read_raw_from(&mut buffer.as_slice()).unwrap(), oid);
        }
    }
}
