use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::severity::{Category, Color, Severity};
use crate::error::ScribeError;

/// Caller-supplied header fields, already normalised: blank strings are
/// absent and off-palette colors are dropped.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LogHeader {
    pub title: String,
    pub severity: Severity,
    pub source: Option<String>,
    pub color: Option<Color>,
    pub description: Option<String>,
}

impl LogHeader {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Builds a header from raw request strings.
    #[must_use]
    pub fn from_raw(
        title: String,
        severity: Option<&str>,
        source: Option<String>,
        color: Option<&str>,
        description: Option<String>,
    ) -> Self {
        Self {
            title,
            severity: severity.map(Severity::parse).unwrap_or_default(),
            source: non_blank(source),
            color: color.and_then(Color::parse),
            description: non_blank(description),
        }
    }

    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = non_blank(Some(source.into()));
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = non_blank(Some(description.into()));
        self
    }

    #[must_use]
    pub fn with_color(mut self, color: Color) -> Self {
        self.color = Some(color);
        self
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Classifier output stored next to the explicit header fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LogMetadata {
    pub derived_severity: Option<Severity>,
    pub derived_source: Option<String>,
    pub derived_category: Option<Category>,
}

/// A record that has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLogRecord {
    pub header: LogHeader,
    pub body: Map<String, Value>,
    pub metadata: LogMetadata,
    pub created_at: DateTime<Utc>,
}

impl NewLogRecord {
    /// Stamps the record with the current time at microsecond precision,
    /// which is what the store keeps.
    #[must_use]
    pub fn new(header: LogHeader, body: Map<String, Value>) -> Self {
        Self {
            header,
            body,
            metadata: LogMetadata::default(),
            created_at: Utc::now().trunc_subsecs(6),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: LogMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at.trunc_subsecs(6);
        self
    }

    pub fn validate(&self) -> Result<(), ScribeError> {
        if self.header.title.trim().is_empty() {
            return Err(ScribeError::validation("title is required"));
        }
        Ok(())
    }

    #[must_use]
    pub fn into_record(self, id: i64) -> LogRecord {
        LogRecord {
            id,
            header: self.header,
            body: self.body,
            metadata: self.metadata,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub id: i64,
    pub header: LogHeader,
    pub body: Map<String, Value>,
    pub metadata: LogMetadata,
    pub created_at: DateTime<Utc>,
}

impl LogRecord {
    /// Derived severity when present, otherwise the explicit one.
    #[must_use]
    pub fn effective_severity(&self) -> &Severity {
        self.metadata
            .derived_severity
            .as_ref()
            .unwrap_or(&self.header.severity)
    }

    #[must_use]
    pub fn effective_source(&self) -> Option<&str> {
        self.metadata
            .derived_source
            .as_deref()
            .or(self.header.source.as_deref())
    }

    #[must_use]
    pub fn effective_color(&self) -> Color {
        self.header
            .color
            .unwrap_or_else(|| Color::for_severity(self.effective_severity()))
    }

    #[must_use]
    pub fn to_view(&self) -> LogView {
        LogView {
            id: self.id,
            header: HeaderView {
                title: self.header.title.clone(),
                severity: self.effective_severity().to_string(),
                source: self.header.source.clone(),
                color: self.effective_color().as_str().to_owned(),
                description: self.header.description.clone(),
            },
            body: self.body.clone(),
            metadata: MetadataView {
                derived_severity: self.metadata.derived_severity.as_ref().map(ToString::to_string),
                derived_source: self.metadata.derived_source.clone(),
                derived_category: self.metadata.derived_category.map(|c| c.as_str().to_owned()),
            },
            created_at: format_timestamp(self.created_at),
        }
    }
}

/// ISO-8601 with a `Z` offset, second precision.
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Outbound record shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogView {
    pub id: i64,
    pub header: HeaderView,
    pub body: Map<String, Value>,
    pub metadata: MetadataView,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderView {
    pub title: String,
    pub severity: String,
    pub source: Option<String>,
    pub color: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataView {
    pub derived_severity: Option<String>,
    pub derived_source: Option<String>,
    pub derived_category: Option<String>,
}
