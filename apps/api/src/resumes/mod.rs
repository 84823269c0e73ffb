//! Resume Version Manager: per-job resume files with exactly one active
//! version per manifest.
//!
//! Bytes go through a [`blob::BlobStore`]; manifests go through the
//! repository. Naming follows `Company_Role_Date[_vN].ext`.

pub mod blob;
pub mod handlers;
pub mod manager;
pub mod naming;

pub use manager::{UploadRequest, VersionManager};
