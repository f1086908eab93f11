use crate::areas::repository::Repository;
use anyhow::Context;
use std::fs;
use std::io::Write;
use tracing::debug;

impl Repository {
    /// Create the object directory and an empty index
    ///
    /// Running it again keeps the existing index and objects.
    pub async fn init(&mut self) -> anyhow::Result<()> {
        let index = self.index();
        let index = index.lock().await;
        let existing = index.path().exists();

        fs::create_dir_all(self.database().objects_path()).with_context(|| {
            format!(
                "Unable to create {}",
                self.database().objects_path().display()
            )
        })?;

        // an empty index file reads as an empty table
        if !existing {
            fs::write(index.path(), b"")
                .with_context(|| format!("Unable to create {}", index.path().display()))?;
        }
        debug!(path = %self.git_path().display(), existing, "initialized repository");

        let verb = if existing {
            "Reinitialized existing"
        } else {
            "Initialized empty"
        };
        writeln!(
            self.writer(),
            "{} Git repository in {}",
            verb,
            self.git_path().display()
        )?;

        Ok(())
    }
}
