//! In-memory doubles for unit tests.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

use crate::domain::{LogFilter, LogPage, LogRecord, NewLogRecord};
use crate::error::ScribeError;
use crate::port::{LogStore, StoreFuture};

/// `LogStore` backed by a vector, with switchable failures.
///
/// `set_should_fail(true)` makes every call fail; `fail_on_id` makes only
/// deletes of that id fail.
pub struct MockStore {
    records: Mutex<Vec<LogRecord>>,
    next_id: AtomicI64,
    should_fail: AtomicBool,
    fail_ids: Mutex<HashSet<i64>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
            should_fail: AtomicBool::new(false),
            fail_ids: Mutex::new(HashSet::new()),
        }
    }

    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    pub fn fail_on_id(&self, id: i64) {
        self.fail_ids.lock().unwrap().insert(id);
    }

    /// Stores a record directly, bypassing validation.
    pub fn insert(&self, record: NewLogRecord) -> i64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.records.lock().unwrap().push(record.into_record(id));
        id
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    fn check(&self) -> Result<(), ScribeError> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(ScribeError::Internal("mock store failure".into()));
        }
        Ok(())
    }

    fn grouped(&self, key: impl Fn(&LogRecord) -> String) -> BTreeMap<String, u64> {
        let mut groups = BTreeMap::new();
        for record in self.records.lock().unwrap().iter() {
            *groups.entry(key(record)).or_insert(0) += 1;
        }
        groups
    }
}

fn matches(record: &LogRecord, filter: &LogFilter) -> bool {
    if let Some(search) = &filter.search {
        let needle = search.to_lowercase();
        let haystack = format!(
            "{} {} {}",
            record.header.title,
            record.header.description.as_deref().unwrap_or(""),
            serde_json::Value::Object(record.body.clone())
        )
        .to_lowercase();
        if !haystack.contains(&needle) {
            return false;
        }
    }
    if filter
        .severity
        .as_ref()
        .is_some_and(|s| s != record.effective_severity())
    {
        return false;
    }
    if filter
        .source
        .as_deref()
        .is_some_and(|s| Some(s) != record.effective_source())
    {
        return false;
    }
    if filter.color.is_some() && filter.color != record.header.color {
        return false;
    }
    if filter.from.is_some_and(|from| record.created_at < from) {
        return false;
    }
    !filter.to.is_some_and(|to| record.created_at > to)
}

fn in_range(at: DateTime<Utc>, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> bool {
    from.is_none_or(|from| at >= from) && to.is_none_or(|to| at < to)
}

impl LogStore for MockStore {
    fn create(&self, record: NewLogRecord) -> StoreFuture<'_, i64> {
        Box::pin(async move {
            self.check()?;
            record.validate()?;
            Ok(self.insert(record))
        })
    }

    fn find_by_id(&self, id: i64) -> StoreFuture<'_, LogRecord> {
        Box::pin(async move {
            self.check()?;
            self.records
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.id == id)
                .cloned()
                .ok_or(ScribeError::NotFound(id))
        })
    }

    fn find_all(&self, filter: LogFilter) -> StoreFuture<'_, LogPage> {
        Box::pin(async move {
            self.check()?;
            let mut matching: Vec<LogRecord> = self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| matches(r, &filter))
                .cloned()
                .collect();
            matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

            let total = matching.len() as u64;
            let records = matching
                .into_iter()
                .skip(filter.offset as usize)
                .take(filter.limit.map_or(usize::MAX, |l| l as usize))
                .collect();
            Ok(LogPage { records, total })
        })
    }

    fn count(&self) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            self.check()?;
            Ok(self.len() as u64)
        })
    }

    fn count_in_range(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            self.check()?;
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| in_range(r.created_at, from, to))
                .count() as u64)
        })
    }

    fn count_by_severity(&self) -> StoreFuture<'_, BTreeMap<String, u64>> {
        Box::pin(async move {
            self.check()?;
            Ok(self.grouped(|r| r.effective_severity().to_string()))
        })
    }

    fn count_by_source(&self) -> StoreFuture<'_, BTreeMap<String, u64>> {
        Box::pin(async move {
            self.check()?;
            Ok(self.grouped(|r| {
                r.header
                    .source
                    .clone()
                    .unwrap_or_else(|| "unknown".to_owned())
            }))
        })
    }

    fn delete(&self, id: i64) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.check()?;
            if self.fail_ids.lock().unwrap().contains(&id) {
                return Err(ScribeError::Internal(format!("mock delete failure for {id}")));
            }
            let mut records = self.records.lock().unwrap();
            let before = records.len();
            records.retain(|r| r.id != id);
            if records.len() == before {
                return Err(ScribeError::NotFound(id));
            }
            Ok(())
        })
    }

    fn delete_older_than(&self, cutoff: DateTime<Utc>) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            self.check()?;
            let mut records = self.records.lock().unwrap();
            let before = records.len();
            records.retain(|r| r.created_at >= cutoff);
            Ok((before - records.len()) as u64)
        })
    }

    fn close(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move { Ok(()) })
    }
}
