//! Durable persistence for job records and resume manifests.
//!
//! `fs` holds the atomic JSON document files, `locks` the per-identity lock
//! table, and `repository` the typed read/write path every other component
//! goes through.

pub mod fs;
pub mod locks;
pub mod repository;

pub use repository::Repository;
