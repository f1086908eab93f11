//! Git directory cache (index) engine
//!
//! A sorted table of staged paths persisted in Git's index file format, with
//! lock-protected builder and editor sessions, plus the object store, working
//! tree access and commands needed to drive it from the command line.

pub mod areas;
pub mod artifacts;
pub mod commands;
