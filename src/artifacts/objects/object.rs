use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tag::Tag;
use crate::artifacts::objects::tree::Tree;
use anyhow::Result;
use bytes::Bytes;
use std::io::BufRead;

/// Serialize the object body (everything after the `<kind> <len>\0` header)
pub trait Packable {
    fn serialize(&self) -> Result<Bytes>;
}

/// Parse an object body
pub trait Unpackable {
    fn deserialize(reader: impl BufRead) -> Result<Self>
    where
        Self: Sized;
}

pub trait Object: Packable {
    fn object_type(&self) -> ObjectType;

    fn display(&self) -> String;

    fn canonical(&self) -> Result<Bytes> {
        Ok(canonical_bytes(self.object_type(), &self.serialize()?))
    }

    fn object_id(&self) -> Result<ObjectId> {
        Ok(ObjectId::hash_of(&self.canonical()?))
    }
}

/// Prefix a body with its `<kind> <len>\0` header
pub fn canonical_bytes(object_type: ObjectType, body: &[u8]) -> Bytes {
    let header = format!("{} {}\0", object_type.as_str(), body.len());
    let mut canonical = Vec::with_capacity(header.len() + body.len());
    canonical.extend_from_slice(header.as_bytes());
    canonical.extend_from_slice(body);
    canonical.into()
}

pub enum ObjectBox {
    Blob(Box<Blob>),
    Tree(Box<Tree>),
    Commit(Box<Commit>),
    Tag(Box<Tag>),
}

impl ObjectBox {
    pub fn parse(object_type: ObjectType, body: impl BufRead) -> Result<Self> {
        Ok(match object_type {
            ObjectType::Blob => ObjectBox::Blob(Box::new(Blob::deserialize(body)?)),
            ObjectType::Tree => ObjectBox::Tree(Box::new(Tree::deserialize(body)?)),
            ObjectType::Commit => ObjectBox::Commit(Box::new(Commit::deserialize(body)?)),
            ObjectType::Tag => ObjectBox::Tag(Box::new(Tag::deserialize(body)?)),
        })
    }

    pub fn display(&self) -> String {
        match self {
            ObjectBox::Blob(blob) => blob.display(),
            ObjectBox::Tree(tree) => tree.display(),
            ObjectBox::Commit(commit) => commit.display(),
            ObjectBox::Tag(tag) => tag.display(),
        }
    }
}
