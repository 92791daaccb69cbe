use crate::areas::repository::Repository;
use crate::artifacts::branch::revision::Revision;
use crate::artifacts::database::tree_walk::WalkItem;
use crate::artifacts::objects::object_type::ObjectType;

impl Repository {
    /// Entries of the tree a revision names
    ///
    /// Without `recursive` only the top level is listed; with it every file is
    /// listed and subtrees are left out.
    pub fn ls_tree(&self, revision: &str, recursive: bool) -> anyhow::Result<Vec<WalkItem>> {
        let oid = Revision::try_parse(revision)?.resolve(self.refs(), self.database())?;
        let tree = self.database().peel_to_tree(&oid)?;

        self.database()
            .walk_tree(&tree)
            .filter(|item| match item {
                Ok(item) if recursive => item.object_type != ObjectType::Tree,
                Ok(item) => item.path.components().count() == 1,
                Err(_) => true,
            })
            .collect()
    }
}
