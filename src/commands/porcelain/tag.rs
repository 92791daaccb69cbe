use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::{BranchName, RefName, TAGS_PREFIX};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tag::Tag;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagInfo {
    pub name: RefName,
    /// The tag object for annotated tags, the commit otherwise
    pub oid: ObjectId,
    pub annotated: bool,
}

impl Repository {
    /// Tag `target` (HEAD when absent); a message makes an annotated tag
    pub fn create_tag(
        &self,
        name: &str,
        target: Option<&str>,
        message: Option<&str>,
    ) -> anyhow::Result<TagInfo> {
        let tag_name = BranchName::try_parse(name)?;
        let ref_name = RefName::tag(&tag_name);
        let target = self.resolve_commit(target.unwrap_or("HEAD"))?;

        let (oid, annotated) = match message {
            Some(message) => {
                let tag = Tag::new(
                    target,
                    ObjectType::Commit,
                    tag_name.to_string(),
                    self.author()?,
                    message.trim().to_string(),
                );
                (self.database().store(&tag)?, true)
            }
            None => (target, false),
        };

        if self.refs().read_raw(&ref_name)?.is_some() {
            anyhow::bail!("tag '{tag_name}' already exists");
        }
        self.refs().update(&ref_name, None, &oid)?;
        tracing::info!(tag = %tag_name, annotated, "created tag");

        Ok(TagInfo {
            name: ref_name,
            oid,
            annotated,
        })
    }

    pub fn list_tags(&self) -> anyhow::Result<Vec<TagInfo>> {
        self.refs()
            .list(TAGS_PREFIX)?
            .into_iter()
            .map(|(name, oid)| {
                let annotated = self.database().object_type(&oid)? == ObjectType::Tag;
                Ok(TagInfo { name, oid, annotated })
            })
            .collect()
    }

    pub fn delete_tag(&self, name: &str) -> anyhow::Result<ObjectId> {
        self.refs().delete(&RefName::tag(&BranchName::try_parse(name)?))
    }
}
