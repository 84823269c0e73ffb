//! Operation Log: append-only record of mutating operations with
//! best-effort undo.

pub mod handlers;
pub mod log;
pub mod undo;

pub use log::OperationLog;
pub use undo::UndoService;
