//! Object store adapters.
//!
//! The [`backend::ObjectStore`] trait abstracts over where the registry
//! bucket physically lives.  Implementations cover AWS S3 (and
//! S3-compatible endpoints), a local directory tree, and an in-memory
//! store used by tests.

pub mod aws;
pub mod backend;
pub mod local;
pub mod memory;

pub use backend::{ListPage, ObjectStore, ObjectStream, StoreError};
