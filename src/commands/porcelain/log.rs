use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::RefName;
use crate::artifacts::log::log_filter::LogFilter;
use crate::artifacts::log::rev_list::RevList;
use crate::artifacts::objects::object_id::ObjectId;
use std::collections::HashMap;

impl Repository {
    /// Lazily walk history from `starts` (HEAD when empty)
    ///
    /// A start of the form `a..b` walks `b` while hiding everything reachable
    /// from `a`. An unborn HEAD yields an empty history.
    pub fn log(&self, starts: &[String], filter: LogFilter) -> anyhow::Result<RevList<'_>> {
        let mut include = Vec::new();
        let mut exclude = Vec::new();

        for start in starts {
            match start.split_once("..") {
                Some((hidden, shown)) => {
                    exclude.push(self.resolve_commit(if hidden.is_empty() { "HEAD" } else { hidden })?);
                    include.push(self.resolve_commit(if shown.is_empty() { "HEAD" } else { shown })?);
                }
                None => include.push(self.resolve_commit(start)?),
            }
        }
        if starts.is_empty() {
            include.extend(self.refs().read_head()?);
        }

        let mut rev_list = RevList::new(self.database(), include, filter)?;
        for hidden in &exclude {
            rev_list = rev_list.hide(hidden)?;
        }
        Ok(rev_list)
    }

    /// Refs pointing at each commit, for decorating log output
    pub fn decorations(&self) -> anyhow::Result<HashMap<ObjectId, Vec<RefName>>> {
        self.refs().reverse_refs()
    }
}
