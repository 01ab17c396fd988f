use serde_json::{Map, Value};

use super::rules::Rules;
use crate::domain::LogHeader;

const TOKEN_TRIM: &[char] = &[
    '.', ',', '!', '?', ':', ';', '"', '\'', '(', ')', '[', ']', '{', '}',
];

/// Works out which service a record came from. Returns `None` rather than
/// guessing when nothing points at a source.
pub(super) fn derive_source(
    rules: &Rules,
    header: &LogHeader,
    body: &Map<String, Value>,
    text_lower: &str,
) -> Option<String> {
    if let Some(source) = header.source.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        return Some(source.to_owned());
    }

    from_body_fields(rules, body)
        .or_else(|| from_title_prefix(&header.title))
        .or_else(|| from_service_rules(rules, text_lower))
        .or_else(|| from_service_token(text_lower))
}

fn from_body_fields(rules: &Rules, body: &Map<String, Value>) -> Option<String> {
    rules.source_fields.iter().find_map(|field| {
        body.get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
    })
}

/// `[api] ...` or `auth: ...`.
fn from_title_prefix(title: &str) -> Option<String> {
    if title.starts_with('[') {
        if let Some(end) = title.find(']').filter(|&end| end > 1) {
            let inner = title[1..end].trim();
            if !inner.is_empty() {
                return Some(inner.to_lowercase());
            }
        }
    }

    let colon = title.find(':').filter(|&idx| idx > 0 && idx < 20)?;
    let prefix = title[..colon].trim();
    if prefix.is_empty() || prefix.contains(char::is_whitespace) {
        return None;
    }
    Some(prefix.to_lowercase())
}

fn from_service_rules(rules: &Rules, text_lower: &str) -> Option<String> {
    rules
        .services
        .iter()
        .find(|rule| rule.matches(text_lower))
        .map(|rule| rule.service.clone())
}

fn from_service_token(text_lower: &str) -> Option<String> {
    text_lower
        .split_whitespace()
        .filter(|word| word.contains("-service") || word.contains("_service"))
        .map(|word| word.trim_matches(TOKEN_TRIM))
        .find(|word| word.chars().count() > 2)
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn derive(header: LogHeader, body: Value) -> Option<String> {
        let rules = Rules::builtin().unwrap();
        let body = body.as_object().cloned().unwrap_or_default();
        let text = format!("{} {}", header.title, Value::Object(body.clone())).to_lowercase();
        derive_source(&rules, &header, &body, &text)
    }

    #[test]
    fn test_explicit_source_wins() {
        let header = LogHeader::new("[auth] Login failed").with_source("gateway");
        assert_eq!(derive(header, json!({"service": "billing"})).as_deref(), Some("gateway"));
    }

    #[test]
    fn test_body_fields_in_priority_order() {
        let body = json!({"module": "m", "app": "shop", "source": ""});
        assert_eq!(derive(LogHeader::new("hello"), body).as_deref(), Some("shop"));
    }

    #[test]
    fn test_non_string_body_field_is_ignored() {
        let body = json!({"service": 12, "component": "worker"});
        assert_eq!(derive(LogHeader::new("hello"), body).as_deref(), Some("worker"));
    }

    #[test]
    fn test_bracket_prefix_is_lowercased() {
        assert_eq!(from_title_prefix("[AUTH] Login failed").as_deref(), Some("auth"));
        assert_eq!(from_title_prefix("[] empty").as_deref(), None);
    }

    #[test]
    fn test_colon_prefix_rules() {
        assert_eq!(from_title_prefix("Billing: invoice sent").as_deref(), Some("billing"));
        assert_eq!(from_title_prefix("two words: nope"), None);
        assert_eq!(from_title_prefix("averyveryverylongprefix: nope"), None);
        assert_eq!(from_title_prefix(": leading colon"), None);
    }

    #[test]
    fn test_database_vendor_rules() {
        assert_eq!(
            derive(LogHeader::new("PostgreSQL query failed"), json!({})).as_deref(),
            Some("postgresql-db")
        );
        assert_eq!(
            derive(LogHeader::new("sql statement prepared"), json!({})).as_deref(),
            Some("database-service")
        );
    }

    #[test]
    fn test_service_rules_in_order() {
        assert_eq!(
            derive(LogHeader::new("JWT refreshed"), json!({})).as_deref(),
            Some("auth-service")
        );
        assert_eq!(
            derive(LogHeader::new("Stripe webhook received"), json!({})).as_deref(),
            Some("payment-service")
        );
        assert_eq!(
            derive(LogHeader::new("cache miss"), json!({})).as_deref(),
            Some("cache-service")
        );
        assert_eq!(derive(LogHeader::new("Redis cache warmed"), json!({})), None);
    }

    #[test]
    fn test_service_token_fallback() {
        assert_eq!(
            derive(LogHeader::new("Ping from (ledger-service)."), json!({})).as_deref(),
            Some("ledger-service")
        );
    }

    #[test]
    fn test_no_guess_when_nothing_matches() {
        assert_eq!(derive(LogHeader::new("hello world"), json!({})), None);
    }
}
