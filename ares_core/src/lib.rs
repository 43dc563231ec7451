//! Platform primitives for the ARES ingestion core.
//!
//! Nothing in this crate knows about the knowledge-graph domain. It provides
//! the virtual file system with atomic replace semantics, canonical JSON
//! serialization with a stable digest, and small clock/environment helpers.

pub mod canonical;
pub mod env;
pub mod fs;
pub mod time;

pub use canonical::{canonical_json, sha256_hex};
pub use fs::{NativeVfs, Vfs, VfsError, VfsResult};
