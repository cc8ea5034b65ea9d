//! MongoDB access layer
//!
//! Client wrapper plus the document schemas for every collection the
//! service owns. The storage abstraction consumed by the core lives
//! in `crate::store`; this module is the MongoDB-specific plumbing.

pub mod mongo;
pub mod schemas;

pub use mongo::{IntoIndexes, MongoClient, MongoCollection};
