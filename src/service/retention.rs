use chrono::{DateTime, Days, Duration as ChronoDuration, SubsecRound, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::logs::broadcast_stats;
use crate::domain::{AgeBuckets, AgeReport, format_timestamp};
use crate::error::ScribeError;
use crate::hub::{EventHub, HubEvent};
use crate::port::LogStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupReport {
    pub deleted_count: u64,
    #[serde(serialize_with = "serialize_cutoff")]
    pub cutoff: DateTime<Utc>,
    pub message: String,
}

fn serialize_cutoff<S: serde::Serializer>(
    cutoff: &DateTime<Utc>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_timestamp(*cutoff))
}

/// Day-based retention policy over the store.
#[derive(Clone)]
pub struct RetentionManager {
    store: Arc<dyn LogStore>,
    hub: Arc<EventHub>,
}

impl RetentionManager {
    pub fn new(store: Arc<dyn LogStore>, hub: Arc<EventHub>) -> Self {
        Self { store, hub }
    }

    /// Deletes every record older than `retention_days` days.
    pub async fn cleanup(&self, retention_days: i64) -> Result<CleanupReport, ScribeError> {
        self.cleanup_at(retention_days, Utc::now()).await
    }

    /// [`Self::cleanup`] against a fixed clock.
    pub async fn cleanup_at(
        &self,
        retention_days: i64,
        now: DateTime<Utc>,
    ) -> Result<CleanupReport, ScribeError> {
        if retention_days < 1 {
            return Err(ScribeError::validation("retention days must be at least 1"));
        }

        let cutoff = ChronoDuration::try_days(retention_days)
            .and_then(|age| now.checked_sub_signed(age))
            .ok_or_else(|| ScribeError::validation("retention days out of range"))?
            .trunc_subsecs(6);

        let deleted_count = self.store.delete_older_than(cutoff).await?;
        let message = if deleted_count == 0 {
            format!("No logs older than {retention_days} days to clean up")
        } else {
            format!("Cleaned up {deleted_count} logs older than {retention_days} days")
        };
        info!(deleted_count, retention_days, cutoff = %format_timestamp(cutoff), "{message}");

        if deleted_count > 0 {
            self.hub.broadcast(HubEvent::logs_expired(deleted_count, cutoff));
            broadcast_stats(self.store.as_ref(), &self.hub).await;
        }

        Ok(CleanupReport {
            deleted_count,
            cutoff,
            message,
        })
    }

    pub async fn age_report(&self) -> Result<AgeReport, ScribeError> {
        self.age_report_at(Utc::now()).await
    }

    /// Buckets are whole UTC days: `today` from midnight, `yesterday` the
    /// day before, `last_week` back to 7 days before midnight, `last_month`
    /// back to 30 days, `older` the rest.
    pub async fn age_report_at(&self, now: DateTime<Utc>) -> Result<AgeReport, ScribeError> {
        let midnight = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc())
            .ok_or_else(|| ScribeError::Internal("midnight out of range".into()))?;
        let days_back = |days: u64| {
            midnight
                .checked_sub_days(Days::new(days))
                .ok_or_else(|| ScribeError::Internal("date out of range".into()))
        };
        let yesterday = days_back(1)?;
        let week = days_back(7)?;
        let month = days_back(30)?;

        let store = self.store.as_ref();
        let by_age = AgeBuckets {
            today: store.count_in_range(Some(midnight), None).await?,
            yesterday: store.count_in_range(Some(yesterday), Some(midnight)).await?,
            last_week: store.count_in_range(Some(week), Some(yesterday)).await?,
            last_month: store.count_in_range(Some(month), Some(week)).await?,
            older: store.count_in_range(None, Some(month)).await?,
        };

        Ok(AgeReport {
            total: store.count().await?,
            last_24_hours: store
                .count_in_range(Some(now - ChronoDuration::hours(24)), None)
                .await?,
            by_age,
        })
    }
}

/// Runs [`RetentionManager::cleanup`] on a fixed interval until shutdown.
pub struct RetentionWorker {
    manager: RetentionManager,
    retention_days: i64,
    interval: Duration,
}

impl RetentionWorker {
    #[must_use]
    pub fn new(manager: RetentionManager, retention_days: i64, interval: Duration) -> Self {
        Self {
            manager,
            retention_days,
            interval,
        }
    }

    /// Returns a handle that resolves once `cancel_token` is cancelled.
    #[must_use]
    pub fn spawn(self, cancel_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel_token).await })
    }

    async fn run(self, cancel_token: CancellationToken) {
        info!(
            retention_days = self.retention_days,
            interval = ?self.interval,
            "retention worker started"
        );

        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.interval,
            self.interval,
        );
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel_token.cancelled() => {
                    info!("retention worker received shutdown signal, stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.manager.cleanup(self.retention_days).await {
                        error!(error = %e, "scheduled retention cleanup failed");
                    }
                }
            }
        }

        info!("retention worker shutdown complete");
    }
}
