pub mod import;
pub mod job;
pub mod oplog;
pub mod resume;
