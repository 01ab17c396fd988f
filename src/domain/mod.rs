mod filter;
mod log_record;
mod severity;
mod stats;

pub use filter::{DateBound, LogFilter, LogPage, parse_date_bound};
pub use log_record::{
    HeaderView, LogHeader, LogMetadata, LogRecord, LogView, MetadataView, NewLogRecord,
    format_timestamp,
};
pub use severity::{Category, Color, PALETTE, Severity};
pub use stats::{AgeBuckets, AgeReport, StatsSnapshot};
