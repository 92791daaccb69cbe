use crate::areas::database::RawObject;
use crate::artifacts::index::checksum::Checksum;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::OBJECT_ID_BYTES;
use crate::artifacts::pack::{PACK_HEADER_SIZE, PACK_SIGNATURE, PACK_VERSION};
use crate::error::RepoError;
use byteorder::{ByteOrder, NetworkEndian};
use std::io::Cursor;

/// Split a received pack into its objects
///
/// Checks framing and the trailer only; object ids are still claims. Any
/// framing problem is reported as [`RepoError::Corrupt`].
pub fn read_pack(pack: &[u8]) -> anyhow::Result<Vec<RawObject>> {
    parse(pack).map_err(|e| RepoError::corrupt("pack", e.to_string()).into())
}

fn parse(pack: &[u8]) -> anyhow::Result<Vec<RawObject>> {
    let mut reader = Checksum::new(Cursor::new(pack));

    let header = reader.read(PACK_HEADER_SIZE)?;
    if &header[..4] != PACK_SIGNATURE {
        anyhow::bail!("bad signature");
    }
    let version = NetworkEndian::read_u32(&header[4..8]);
    if version != PACK_VERSION {
        anyhow::bail!("unsupported version {version}");
    }
    let count = NetworkEndian::read_u32(&header[8..12]) as usize;

    let mut objects = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let entry_header = reader.read(OBJECT_ID_BYTES + 5)?;
        let oid = ObjectId::from_raw(&entry_header[..OBJECT_ID_BYTES])?;
        let object_type = ObjectType::from_code(entry_header[OBJECT_ID_BYTES])?;
        let length = NetworkEndian::read_u32(&entry_header[OBJECT_ID_BYTES + 1..]) as usize;
        if length > pack.len() {
            anyhow::bail!("object {oid} claims {length} bytes, more than the pack holds");
        }
        let body = reader.read(length)?;

        objects.push(RawObject::new(oid, object_type, body));
    }

    reader.verify()?;
    if reader.into_inner().position() as usize != pack.len() {
        anyhow::bail!("trailing data after checksum");
    }

    Ok(objects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::objects::object::canonical_bytes;
    use crate::artifacts::pack::writer::write_pack;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    fn blob(content: &str) -> RawObject {
        let body = Bytes::from(content.to_string());
        let oid = ObjectId::hash_of(&canonical_bytes(ObjectType::Blob, &body));
        RawObject::new(oid, ObjectType::Blob, body)
    }

    #[test]
    fn pack_preserves_objects_and_order() {
        let objects = vec![blob("one"), blob("two"), blob("")];

        let pack = write_pack(&objects).unwrap();

        assert_eq!(&pack[..4], b"PACK");
        assert_eq!(read_pack(&pack).unwrap(), objects);
    }

    #[test]
    fn flipped_byte_fails_the_trailer() {
        let mut pack = write_pack(&[blob("content")]).unwrap().to_vec();
        let last_body_byte = pack.len() - 21;
        pack[last_body_byte] ^= 0x01;

        let err = read_pack(&pack).unwrap_err();
        assert!(matches!(RepoError::find(&err), Some(RepoError::Corrupt { .. })));
    }

    #[test]
    fn truncated_pack_is_corrupt() {
        let pack = write_pack(&[blob("content")]).unwrap();

        let err = read_pack(&pack[..pack.len() - 3]).unwrap_err();
        assert!(matches!(RepoError::find(&err), Some(RepoError::Corrupt { .. })));
    }

    #[test]
    fn empty_pack_is_valid() {
        let pack = write_pack(&[]).unwrap();
        assert!(read_pack(&pack).unwrap().is_empty());
    }
}
