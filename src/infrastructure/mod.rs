pub mod logging;
pub mod sink;

pub use sink::{AuditSink, MemorySink, TracingSink};
