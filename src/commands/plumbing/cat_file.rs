use crate::areas::repository::Repository;
use crate::artifacts::branch::revision::Revision;
use crate::artifacts::objects::object::ObjectBox;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use bytes::Bytes;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatFile {
    pub oid: ObjectId,
    pub object_type: ObjectType,
    pub body: Bytes,
}

impl CatFile {
    pub fn size(&self) -> usize {
        self.body.len()
    }

    /// Human-readable rendering (`cat-file -p`)
    pub fn pretty(&self) -> anyhow::Result<String> {
        Ok(ObjectBox::parse(self.object_type, self.body.as_ref())?.display())
    }
}

impl Repository {
    /// Load any object named by a revision, tags and trees included
    pub fn cat_file(&self, revision: &str) -> anyhow::Result<CatFile> {
        let oid = Revision::try_parse(revision)?.resolve(self.refs(), self.database())?;
        let (object_type, body) = self.database().read(&oid)?;

        Ok(CatFile {
            oid,
            object_type,
            body,
        })
    }
}
