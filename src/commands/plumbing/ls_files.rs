use crate::areas::repository::Repository;
use std::io::Write;

impl Repository {
    /// List staged paths
    ///
    /// With `stage`, every entry is shown as `<mode> <oid> <stage>\t<path>`;
    /// without it each path is shown once. `unmerged` limits the listing to
    /// conflict stages and implies `stage`.
    pub async fn ls_files(&mut self, stage: bool, unmerged: bool) -> anyhow::Result<()> {
        let index = self.index();
        let mut index = index.lock().await;

        index.rehydrate()?;

        let mut previous: Option<&[u8]> = None;
        for entry in index.entries() {
            if unmerged && entry.is_merged() {
                continue;
            }

            if stage || unmerged {
                writeln!(
                    self.writer(),
                    "{} {} {}\t{}",
                    entry.mode,
                    entry.oid,
                    entry.stage().as_u8(),
                    entry.path_str()
                )?;
            } else if previous != Some(entry.path()) {
                writeln!(self.writer(), "{}", entry.path_str())?;
            }

            previous = Some(entry.path());
        }

        Ok(())
    }
}
