use crate::areas::repository::Repository;
use crate::artifacts::index::path_cmp;
use crate::artifacts::objects::object_id::ObjectId;
use tracing::debug;

impl Repository {
    /// Replace the index with the contents of a tree
    ///
    /// With `prefix`, the current entries are kept and the tree is grafted
    /// under that directory, which must not be staged yet. With `empty`, the
    /// index is cleared.
    pub async fn read_tree(
        &mut self,
        tree: Option<&str>,
        prefix: Option<&str>,
        empty: bool,
    ) -> anyhow::Result<()> {
        let tree_id = match (tree, empty) {
            (Some(_), true) => anyhow::bail!("passing trees as arguments contradicts --empty"),
            (Some(tree), false) => Some(ObjectId::try_parse(tree)?),
            (None, true) => None,
            (None, false) => anyhow::bail!("a tree to read is required"),
        };

        let prefix = match prefix {
            Some(prefix) => {
                let dir = prefix.trim_end_matches('/');
                if dir.is_empty() {
                    Vec::new()
                } else {
                    path_cmp::as_dir_prefix(dir.as_bytes())
                }
            }
            None => Vec::new(),
        };

        let flattened = match tree_id {
            Some(tree_id) => self.database().flatten_tree(&tree_id, &prefix)?,
            None => Vec::new(),
        };

        let index = self.index();
        let mut index = index.lock().await;

        index.transaction(|index| -> anyhow::Result<()> {
            let grafting = !prefix.is_empty();
            if grafting && !index.entries_with_prefix(&prefix).is_empty() {
                anyhow::bail!(
                    "subdirectory '{}' already exists",
                    String::from_utf8_lossy(&prefix)
                );
            }

            let mut builder = index.builder();
            if grafting {
                builder.keep(0, usize::MAX);
            }

            for (path, entry) in flattened {
                builder.add(entry.to_index_entry(&path)?)?;
            }

            debug!(entries = builder.len(), grafting, "reading tree into index");
            builder.commit()?;

            Ok(())
        })
    }
}
