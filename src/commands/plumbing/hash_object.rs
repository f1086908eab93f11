use crate::areas::repository::Repository;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::object::Object;
use anyhow::Context;
use std::io::Write;

impl Repository {
    pub fn hash_object(&mut self, object_path: &str, write: bool) -> anyhow::Result<()> {
        // read object file
        let object_data = std::fs::read(object_path)
            .with_context(|| format!("could not open '{}' for reading", object_path))?;
        let object = Blob::new(object_data.into());

        // hash
        let object_id = object.object_id()?;

        // write (if write is true) as compressed object file
        if write {
            self.database().store(&object)?;
        }

        writeln!(self.writer(), "{}", object_id)?;

        Ok(())
    }
}
