use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use crate::domain::{LogFilter, LogPage, LogRecord, NewLogRecord};
use crate::error::ScribeError;

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ScribeError>> + Send + 'a>>;

/// Durable keyed collection of log records.
///
/// This trait is dyn-compatible by using boxed futures instead of `impl Future`.
pub trait LogStore: Send + Sync {
    /// Persists a record and returns its assigned id.
    fn create(&self, record: NewLogRecord) -> StoreFuture<'_, i64>;

    fn find_by_id(&self, id: i64) -> StoreFuture<'_, LogRecord>;

    /// One page ordered newest first, plus the total matching `filter`
    /// regardless of its limit and offset.
    fn find_all(&self, filter: LogFilter) -> StoreFuture<'_, LogPage>;

    fn count(&self) -> StoreFuture<'_, u64>;

    /// Records with `from <= created_at < to`; either bound may be open.
    fn count_in_range(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> StoreFuture<'_, u64>;

    fn count_last_24_hours(&self) -> StoreFuture<'_, u64> {
        self.count_in_range(Some(Utc::now() - Duration::hours(24)), None)
    }

    /// Totals keyed by effective severity.
    fn count_by_severity(&self) -> StoreFuture<'_, BTreeMap<String, u64>>;

    /// Totals keyed by explicit source, `unknown` when none was given.
    fn count_by_source(&self) -> StoreFuture<'_, BTreeMap<String, u64>>;

    /// Fails with `NotFound` when no record has this id.
    fn delete(&self, id: i64) -> StoreFuture<'_, ()>;

    /// Removes records with `created_at < cutoff` and returns how many went.
    fn delete_older_than(&self, cutoff: DateTime<Utc>) -> StoreFuture<'_, u64>;

    /// Flushes pending writes to durable storage and releases connections.
    fn close(&self) -> StoreFuture<'_, ()>;
}
