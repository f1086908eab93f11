//! Git data structures and algorithms
//!
//! This module contains the core Git types and algorithms:
//!
//! - `database`: Database entry types
//! - `index`: Index/staging area data structures and editing sessions
//! - `objects`: Git object types (blob, tree)

pub mod database;
pub mod index;
pub mod objects;
