//! Database entry types
//!
//! Entries read back from stored tree objects, before they are turned into
//! index entries.

pub mod database_entry;
