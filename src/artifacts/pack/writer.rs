use crate::areas::database::RawObject;
use crate::artifacts::index::checksum::Checksum;
use crate::artifacts::pack::{PACK_SIGNATURE, PACK_VERSION};
use byteorder::{NetworkEndian, WriteBytesExt};
use bytes::Bytes;

/// Serialize objects into a pack, trailer included
pub fn write_pack(objects: &[RawObject]) -> anyhow::Result<Bytes> {
    let mut writer = Checksum::new(Vec::new());

    let mut header = Vec::with_capacity(super::PACK_HEADER_SIZE);
    header.extend_from_slice(PACK_SIGNATURE);
    header.write_u32::<NetworkEndian>(PACK_VERSION)?;
    header.write_u32::<NetworkEndian>(u32::try_from(objects.len())?)?;
    writer.write(&header)?;

    for object in objects {
        let mut entry_header = Vec::with_capacity(25);
        object.oid.write_raw_to(&mut entry_header)?;
        entry_header.write_u8(object.object_type.as_code())?;
        entry_header.write_u32::<NetworkEndian>(u32::try_from(object.body.len())?)?;
        writer.write(&entry_header)?;
        writer.write(&object.body)?;
    }

    writer.write_checksum()?;
    let pack = writer.into_inner();
    tracing::trace!(objects = objects.len(), bytes = pack.len(), "wrote pack");
    Ok(Bytes::from(pack))
}
