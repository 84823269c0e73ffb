//! Bulk Import Reconciler: scan a folder of resumes, map each file to a job,
//! then import the mapped ones with per-item independence.

pub mod handlers;
pub mod matcher;
pub mod reconciler;

pub use reconciler::{BulkImportReconciler, MappingUpdate};
