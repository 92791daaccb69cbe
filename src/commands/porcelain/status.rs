use crate::areas::repository::Repository;
use crate::artifacts::status::status_info::StatusInfo;

impl Repository {
    /// Three-way comparison of HEAD, the index and the working tree
    ///
    /// Takes no repository lock and writes nothing.
    pub async fn status(&self) -> anyhow::Result<StatusInfo> {
        let index = self.index();
        let mut index = index.lock().await;
        index.rehydrate()?;

        let head = self.refs().read_head()?;
        self.status_inspector().compute(&index, head.as_ref())
    }
}
