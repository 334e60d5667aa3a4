//! Version control: recorded operations and the undo/redo log.

pub mod log;
pub mod operation;

pub use log::OperationLog;
pub use operation::{Operation, OperationRecord, Verb, VersionId};
