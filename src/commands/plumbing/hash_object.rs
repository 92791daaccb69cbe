use crate::areas::repository::Repository;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::object::Object;
use crate::artifacts::objects::object_id::ObjectId;
use anyhow::Context;
use std::path::Path;

impl Repository {
    /// Blob id of a file's content, stored as well when `write` is set
    pub fn hash_object(&self, file: &Path, write: bool) -> anyhow::Result<ObjectId> {
        let data = std::fs::read(file).with_context(|| format!("unable to read {}", file.display()))?;
        let blob = Blob::new(data.into());

        if write {
            self.database().store(&blob)
        } else {
            blob.object_id()
        }
    }
}
