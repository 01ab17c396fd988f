use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::domain::{LogView, StatsSnapshot, format_timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Connected,
    LogCreated,
    LogDeleted,
    StatsUpdated,
    Ping,
}

impl EventKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::LogCreated => "log_created",
            Self::LogDeleted => "log_deleted",
            Self::StatsUpdated => "stats_updated",
            Self::Ping => "ping",
        }
    }
}

/// Wire shape: `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub data: Value,
}

impl HubEvent {
    #[must_use]
    pub fn connected(subscriber_id: u64) -> Self {
        Self {
            kind: EventKind::Connected,
            data: json!({
                "message": "Connected to scribe event stream",
                "subscriber_id": subscriber_id,
                "timestamp": format_timestamp(Utc::now()),
            }),
        }
    }

    #[must_use]
    pub fn log_created(view: &LogView) -> Self {
        Self {
            kind: EventKind::LogCreated,
            data: serde_json::to_value(view).unwrap_or_default(),
        }
    }

    #[must_use]
    pub fn log_deleted(id: i64) -> Self {
        Self {
            kind: EventKind::LogDeleted,
            data: json!({ "id": id }),
        }
    }

    /// Bulk removal by the retention policy.
    #[must_use]
    pub fn logs_expired(deleted_count: u64, cutoff: DateTime<Utc>) -> Self {
        Self {
            kind: EventKind::LogDeleted,
            data: json!({
                "deleted_count": deleted_count,
                "cutoff": format_timestamp(cutoff),
            }),
        }
    }

    #[must_use]
    pub fn stats_updated(stats: &StatsSnapshot) -> Self {
        Self {
            kind: EventKind::StatsUpdated,
            data: serde_json::to_value(stats).unwrap_or_default(),
        }
    }

    #[must_use]
    pub fn ping() -> Self {
        Self {
            kind: EventKind::Ping,
            data: json!({ "timestamp": format_timestamp(Utc::now()) }),
        }
    }
}
