use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::classifier::{Classification, Classifier};
use crate::domain::{
    LogFilter, LogHeader, LogMetadata, LogPage, LogRecord, NewLogRecord, Severity, StatsSnapshot,
};
use crate::error::ScribeError;
use crate::hub::{EventHub, HubEvent};
use crate::port::LogStore;

/// Ingestion, lookup and deletion of records.
#[derive(Clone)]
pub struct LogService {
    store: Arc<dyn LogStore>,
    classifier: Classifier,
    hub: Arc<EventHub>,
}

impl LogService {
    pub fn new(store: Arc<dyn LogStore>, classifier: Classifier, hub: Arc<EventHub>) -> Self {
        Self {
            store,
            classifier,
            hub,
        }
    }

    /// Validates, classifies and persists a record, then announces it.
    pub async fn ingest(
        &self,
        header: LogHeader,
        body: Map<String, Value>,
    ) -> Result<LogRecord, ScribeError> {
        let candidate = NewLogRecord::new(header, body);
        candidate.validate()?;

        let classification = self.classifier.classify(&candidate.header, &candidate.body);
        let metadata = derive_metadata(&candidate.header, classification);
        let candidate = candidate.with_metadata(metadata);

        let id = self.store.create(candidate.clone()).await?;
        let record = candidate.into_record(id);

        info!(
            id,
            severity = %record.effective_severity(),
            source = record.effective_source().unwrap_or(""),
            "log ingested"
        );
        self.hub.broadcast(HubEvent::log_created(&record.to_view()));
        Ok(record)
    }

    pub async fn get(&self, id: i64) -> Result<LogRecord, ScribeError> {
        self.store.find_by_id(id).await
    }

    pub async fn list(&self, filter: LogFilter) -> Result<LogPage, ScribeError> {
        self.store.find_all(filter).await
    }

    pub async fn delete(&self, id: i64) -> Result<(), ScribeError> {
        self.store.delete(id).await?;
        info!(id, "log deleted");
        self.hub.broadcast(HubEvent::log_deleted(id));
        Ok(())
    }

    /// Attempts every id independently and returns how many were removed.
    pub async fn delete_many(&self, ids: &[i64]) -> Result<u64, ScribeError> {
        if ids.is_empty() {
            return Err(ScribeError::validation("ids must not be empty"));
        }

        let mut deleted = 0u64;
        for &id in ids {
            match self.store.delete(id).await {
                Ok(()) => {
                    deleted += 1;
                    self.hub.broadcast(HubEvent::log_deleted(id));
                }
                Err(e) if e.is_not_found() => debug!(id, "bulk delete skipped missing log"),
                Err(e) => warn!(id, error = %e, "bulk delete failed for log"),
            }
        }

        info!(requested = ids.len(), deleted, "bulk delete finished");
        if deleted > 0 {
            self.broadcast_stats().await;
        }
        Ok(deleted)
    }

    pub async fn stats(&self) -> Result<StatsSnapshot, ScribeError> {
        stats_snapshot(self.store.as_ref()).await
    }

    /// Sends a fresh `stats_updated`. A failed read is logged, not returned.
    pub(crate) async fn broadcast_stats(&self) {
        broadcast_stats(self.store.as_ref(), &self.hub).await;
    }
}

pub(super) async fn stats_snapshot(store: &dyn LogStore) -> Result<StatsSnapshot, ScribeError> {
    Ok(StatsSnapshot {
        total: store.count().await?,
        last_24_hours: store.count_last_24_hours().await?,
        by_severity: store.count_by_severity().await?,
        by_source: store.count_by_source().await?,
    })
}

pub(super) async fn broadcast_stats(store: &dyn LogStore, hub: &EventHub) {
    match stats_snapshot(store).await {
        Ok(stats) => hub.broadcast(HubEvent::stats_updated(&stats)),
        Err(e) => warn!(error = %e, "could not compute stats for broadcast"),
    }
}

/// Keeps only the classifier output that does not contradict the caller:
/// an explicit non-info severity and an explicit source always stand.
fn derive_metadata(header: &LogHeader, classification: Classification) -> LogMetadata {
    let derived_severity = (header.severity == Severity::Info
        && classification.severity != Severity::Info)
        .then_some(classification.severity);
    let derived_source = if header.source.is_none() {
        classification.source
    } else {
        None
    };

    LogMetadata {
        derived_severity,
        derived_source,
        derived_category: Some(classification.category),
    }
}
