//! The update log: spec.md §2.2-§2.4 and §4.7.

pub mod frame;
pub mod reader;
pub mod writer;

pub use frame::{UlogFrame, ULOG_KEEPALIVE, ULOG_MAGIC};
pub use reader::LogReader;
pub use writer::UpdateLog;
