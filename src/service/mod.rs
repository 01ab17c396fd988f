//! Use cases behind the HTTP handlers. Each service owns the order of
//! operations on its write path; handlers only translate requests.

mod logs;
mod retention;

pub use logs::LogService;
pub use retention::{CleanupReport, RetentionManager, RetentionWorker};
