//! Traits shared by stored objects
//!
//! An object's id is the SHA-1 of its serialized form, header included, so
//! hashing never needs the database.

use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use anyhow::Result;
use bytes::Bytes;
use sha1::{Digest, Sha1};
use std::io::BufRead;

pub trait Packable {
    /// Full stored form: `<kind> <size>\0<content>`
    fn serialize(&self) -> Result<Bytes>;
}

pub trait Unpackable {
    /// Parse the content that follows an already consumed header
    fn deserialize(reader: impl BufRead) -> Result<Self>
    where
        Self: Sized;
}

pub trait Object: Packable {
    fn object_type(&self) -> ObjectType;

    fn object_id(&self) -> Result<ObjectId> {
        let content = self.serialize()?;
        let mut hasher = Sha1::new();
        hasher.update(&content);

        Ok(ObjectId::from(hasher.finalize()))
    }
}
