pub mod handlers;
pub mod service;

pub use service::{CaptureInput, CaptureOutcome, JobPatch, JobService};
