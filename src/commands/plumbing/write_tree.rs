use crate::areas::repository::Repository;
use crate::artifacts::objects::object::Object;
use crate::artifacts::objects::tree::Tree;
use std::io::Write;

impl Repository {
    /// Store the staged table as tree objects and print the root tree id
    pub async fn write_tree(&mut self) -> anyhow::Result<()> {
        let index = self.index();
        let mut index = index.lock().await;

        index.rehydrate()?;

        if let Some(entry) = index.entries().find(|entry| !entry.is_merged()) {
            anyhow::bail!(
                "{}: unmerged ({})\nfatal: write-tree: error building trees",
                entry.path_str(),
                entry.oid
            );
        }

        let tree = Tree::build(index.entries())?;
        let store_tree = &|tree: &Tree| self.database().store(tree).map(|_| ());
        tree.traverse(store_tree)?;

        writeln!(self.writer(), "{}", tree.object_id()?)?;

        Ok(())
    }
}
