//! Object identity and hashing for gitxref.
//!
//! Provides the 20-byte `ObjectId`, hex encoding/decoding, and the streaming
//! SHA-1 `Hasher` used for blob hashing and cache keys.

mod error;
pub mod hex;
pub mod hasher;
mod oid;

pub use error::HashError;
pub use hasher::Hasher;
pub use oid::ObjectId;
