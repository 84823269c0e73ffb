// Duplicate detection: pairwise scoring, transitive grouping, merge lineage.
// Scans are read-only and run over a snapshot; merges go through
// Repository::apply_batch so they land on every record or on none.

pub mod engine;
pub mod grouping;
pub mod handlers;
pub mod scoring;
