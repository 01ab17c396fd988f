//! Severity, category and source inference for incoming records.
//!
//! Classification is a pure function of the record and the [`Rules`] it was
//! built with. Stages run in a fixed order and the first stage that fires
//! decides the severity; nothing here can fail.

pub mod rules;
mod source;

use serde_json::{Map, Value};
use std::sync::Arc;

use crate::domain::{Category, LogHeader, Severity};
pub use rules::{DurationThresholds, PatternRule, Rules, ServiceRule};

/// Classifier output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub severity: Severity,
    pub category: Category,
    pub source: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Arc<Rules>,
}

impl Classifier {
    #[must_use]
    pub fn new(rules: Arc<Rules>) -> Self {
        Self { rules }
    }

    #[must_use]
    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    #[must_use]
    pub fn classify(&self, header: &LogHeader, body: &Map<String, Value>) -> Classification {
        let text = searchable_text(header, body);
        let text_lower = text.to_lowercase();

        let (severity, category) = self.severity_and_category(&text, &text_lower, body);
        let source = source::derive_source(&self.rules, header, body, &text_lower);

        Classification {
            severity,
            category,
            source,
        }
    }

    fn severity_and_category(
        &self,
        text: &str,
        text_lower: &str,
        body: &Map<String, Value>,
    ) -> (Severity, Category) {
        let rules = &*self.rules;

        if contains_any(text_lower, &rules.security) {
            return (Severity::Critical, Category::Security);
        }
        if let Some(severity) = first_pattern(text_lower, &rules.business) {
            return (severity, Category::Business);
        }
        if let Some(severity) = self.performance_severity(text_lower, body) {
            return (severity, Category::Performance);
        }
        if let Some(severity) = self.http_status_severity(text) {
            return (severity, Category::Http);
        }

        let detected = self.detect_category(text_lower);

        if self.has_stack_trace(text_lower) {
            return (Severity::Error, detected);
        }
        if let Some(severity) = first_pattern(text_lower, &rules.database) {
            return (severity, Category::Database);
        }
        if let Some(severity) = first_pattern(text, &rules.system_codes) {
            return (severity, Category::System);
        }

        let severity = rules
            .keyword_buckets
            .iter()
            .find(|(_, keywords)| contains_any(text_lower, keywords))
            .map_or(Severity::Info, |(severity, _)| severity.clone());
        (severity, detected)
    }

    fn performance_severity(&self, text_lower: &str, body: &Map<String, Value>) -> Option<Severity> {
        if let Some(severity) = first_pattern(text_lower, &self.rules.performance) {
            return Some(severity);
        }
        self.rules
            .duration_fields
            .iter()
            .find_map(|field| body.get(field).and_then(duration_millis))
            .map(|ms| self.rules.duration_thresholds.severity_for(ms))
    }

    /// Only the first pattern that captures a code is consulted; a code
    /// missing from the status table lets the pipeline continue.
    fn http_status_severity(&self, text: &str) -> Option<Severity> {
        let code = self
            .rules
            .http_status_patterns
            .iter()
            .find_map(|pattern| pattern.captures(text))
            .and_then(|captures| captures.get(1))
            .and_then(|m| m.as_str().parse::<u16>().ok())?;
        self.rules.status_severity(code).cloned()
    }

    fn has_stack_trace(&self, text_lower: &str) -> bool {
        self.rules
            .stack_trace_indicators
            .iter()
            .any(|indicator| text_lower.contains(&indicator.to_lowercase()))
    }

    /// Category by keyword priority, independent of the severity stages.
    #[must_use]
    pub fn detect_category(&self, text_lower: &str) -> Category {
        if contains_any(text_lower, &self.rules.security) {
            return Category::Security;
        }
        self.rules
            .category_keywords
            .iter()
            .find(|(_, keywords)| contains_any(text_lower, keywords))
            .map_or(Category::General, |(category, _)| *category)
    }
}

/// Title, description and the serialised body joined by spaces.
fn searchable_text(header: &LogHeader, body: &Map<String, Value>) -> String {
    let mut text = header.title.clone();
    if let Some(description) = header.description.as_deref().filter(|d| !d.is_empty()) {
        text.push(' ');
        text.push_str(description);
    }
    if !body.is_empty() {
        if let Ok(serialized) = serde_json::to_string(body) {
            text.push(' ');
            text.push_str(&serialized);
        }
    }
    text
}

fn contains_any(text: &str, keywords: &[String]) -> bool {
    keywords.iter().any(|k| text.contains(k.as_str()))
}

fn first_pattern(text: &str, table: &[PatternRule]) -> Option<Severity> {
    table
        .iter()
        .find(|rule| text.contains(rule.pattern.as_str()))
        .map(|rule| rule.severity.clone())
}

/// Positive whole milliseconds from a number or numeric string.
fn duration_millis(value: &Value) -> Option<u64> {
    let ms = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if ms.is_finite() && ms >= 1.0 {
        // Whole milliseconds; the fraction is dropped.
        Some(ms.trunc() as u64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn classifier() -> Classifier {
        Classifier::new(Arc::new(Rules::builtin().unwrap()))
    }

    fn classify_title(title: &str) -> Classification {
        classifier().classify(&LogHeader::new(title), &Map::new())
    }

    fn classify_with_body(title: &str, body: Value) -> Classification {
        let body = body.as_object().cloned().unwrap_or_default();
        classifier().classify(&LogHeader::new(title), &body)
    }

    #[test]
    fn test_security_keyword_is_critical() {
        let c = classify_title("Unauthorized access to /admin");
        assert_eq!(c.severity, Severity::Critical);
        assert_eq!(c.category, Category::Security);
    }

    #[test]
    fn test_security_precedes_http_status() {
        let c = classify_title("Forbidden: request returned 200 OK");
        assert_eq!(c.severity, Severity::Critical);
        assert_eq!(c.category, Category::Security);
    }

    #[test]
    fn test_http_status_extraction() {
        let c = classify_title("Request returned status 500");
        assert_eq!(c.severity, Severity::Error);
        assert_eq!(c.category, Category::Http);

        let c = classify_title("GET /health returned 503");
        assert_eq!(c.severity, Severity::Critical);
        assert_eq!(c.category, Category::Http);

        let c = classify_with_body("upstream reply", json!({"status_code": "404"}));
        assert_eq!(c.severity, Severity::Warning);
        assert_eq!(c.category, Category::Http);
    }

    #[test]
    fn test_unknown_status_code_falls_through() {
        let c = classify_title("teapot returned 418");
        assert_eq!(c.category, Category::General);
        assert_eq!(c.severity, Severity::Info);
    }

    #[test]
    fn test_business_patterns() {
        let c = classify_title("Payment failed for order 991");
        assert_eq!(c.severity, Severity::Error);
        assert_eq!(c.category, Category::Business);

        let c = classify_title("Checkout completed");
        assert_eq!(c.severity, Severity::Success);
        assert_eq!(c.category, Category::Business);
    }

    #[test]
    fn test_performance_pattern() {
        let c = classify_title("Disk full on /var");
        assert_eq!(c.severity, Severity::Critical);
        assert_eq!(c.category, Category::Performance);
    }

    #[test]
    fn test_duration_buckets() {
        let cases = [
            (json!({"duration_ms": 50}), Severity::Success),
            (json!({"duration_ms": 500}), Severity::Info),
            (json!({"duration_ms": 2500}), Severity::Warning),
            (json!({"duration_ms": 4000}), Severity::Error),
        ];
        for (body, expected) in cases {
            let c = classify_with_body("Request completed", body.clone());
            assert_eq!(c.severity, expected, "body {body}");
            assert_eq!(c.category, Category::Performance);
        }
    }

    #[test]
    fn test_duration_numeric_string_and_field_order() {
        let c = classify_with_body("Job done", json!({"latency": "2500"}));
        assert_eq!(c.severity, Severity::Warning);

        let c = classify_with_body("Job done", json!({"duration": "n/a", "elapsed_ms": 20}));
        assert_eq!(c.severity, Severity::Success);
        assert_eq!(c.category, Category::Performance);
    }

    #[test]
    fn test_unparsable_duration_is_ignored() {
        let c = classify_with_body("Job done", json!({"duration": "soon"}));
        assert_eq!(c.severity, Severity::Success);
    }

    #[test]
    fn test_stack_trace_keeps_detected_category() {
        let c = classify_title("Traceback (most recent call last) in worker");
        assert_eq!(c.severity, Severity::Error);
        assert_eq!(c.category, Category::General);
    }

    #[test]
    fn test_database_patterns() {
        let c = classify_title("Deadlock detected on accounts");
        assert_eq!(c.severity, Severity::Critical);
        assert_eq!(c.category, Category::Database);
    }

    #[test]
    fn test_system_codes_are_case_sensitive() {
        let c = classify_title("write failed with ENOSPC");
        assert_eq!(c.severity, Severity::Critical);
        assert_eq!(c.category, Category::System);

        let c = classify_title("the word enospc in lowercase");
        assert_ne!(c.category, Category::System);
    }

    #[test]
    fn test_keyword_bucket_priority() {
        assert_eq!(classify_title("Cache warmup failed").severity, Severity::Error);
        assert_eq!(classify_title("Retrying connection").severity, Severity::Warning);
        assert_eq!(classify_title("Backup finished").severity, Severity::Success);
        assert_eq!(classify_title("Entering main loop").severity, Severity::Debug);
    }

    #[test]
    fn test_default_is_info_general() {
        let c = classify_title("hello world");
        assert_eq!(c.severity, Severity::Info);
        assert_eq!(c.category, Category::General);
        assert_eq!(c.source, None);
    }

    #[test]
    fn test_keyword_fallback_uses_detected_category() {
        let c = classify_title("PostgreSQL query failed");
        assert_eq!(c.severity, Severity::Error);
        assert_eq!(c.category, Category::Database);
        assert_eq!(c.source.as_deref(), Some("postgresql-db"));
    }

    #[test]
    fn test_description_is_searched() {
        let header = LogHeader::new("nightly job").with_description("Deadlock in ledger");
        let c = classifier().classify(&header, &Map::new());
        assert_eq!(c.category, Category::Database);
    }

    #[test]
    fn test_substituted_rules() {
        let mut rules = Rules::builtin().unwrap();
        rules.security.clear();
        rules.keyword_buckets = vec![(Severity::parse("audit"), vec!["unauthorized".into()])];
        let c = Classifier::new(Arc::new(rules))
            .classify(&LogHeader::new("Unauthorized access"), &Map::new());
        assert_eq!(c.severity, Severity::Custom("audit".into()));
    }

    #[test]
    fn test_bracket_source_from_title() {
        let c = classify_title("[auth] Login failed");
        assert_eq!(c.source.as_deref(), Some("auth"));
        assert_eq!(c.category, Category::Business);
        assert_eq!(c.severity, Severity::Warning);
    }
}
