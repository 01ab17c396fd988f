use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-supplied or derived severity label.
///
/// The six standard levels are recognised case-insensitively; anything else
/// is kept verbatim as a custom severity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Severity {
    Critical,
    Error,
    Warning,
    Success,
    #[default]
    Info,
    Debug,
    Custom(String),
}

impl Severity {
    /// Parses a label. Blank input falls back to `info`.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "" | "info" => Self::Info,
            "critical" => Self::Critical,
            "error" => Self::Error,
            "warning" => Self::Warning,
            "success" => Self::Success,
            "debug" => Self::Debug,
            _ => Self::Custom(trimmed.to_owned()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Critical => "critical",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Success => "success",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Custom(label) => label,
        }
    }

    #[must_use]
    pub fn is_standard(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Severity {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<Severity> for String {
    fn from(severity: Severity) -> Self {
        severity.as_str().to_owned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Http,
    Database,
    Security,
    Performance,
    Business,
    System,
    General,
}

impl Category {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Database => "database",
            Self::Security => "security",
            Self::Performance => "performance",
            Self::Business => "business",
            Self::System => "system",
            Self::General => "general",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "http" => Self::Http,
            "database" => Self::Database,
            "security" => Self::Security,
            "performance" => Self::Performance,
            "business" => Self::Business,
            "system" => Self::System,
            _ => Self::General,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named colors accepted on the `color` header field.
pub const PALETTE: [&str; 22] = [
    "slate", "gray", "zinc", "neutral", "stone", "red", "orange", "amber", "yellow", "lime",
    "green", "emerald", "teal", "cyan", "sky", "blue", "indigo", "violet", "purple", "fuchsia",
    "pink", "rose",
];

/// A palette color. Only constructible from a palette entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Color(&'static str);

impl Color {
    pub const DEFAULT: Self = Self("slate");

    /// Case-insensitive palette lookup; `None` for anything off-palette.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        PALETTE
            .iter()
            .copied()
            .find(|name| name.eq_ignore_ascii_case(trimmed))
            .map(Self)
    }

    #[must_use]
    pub fn for_severity(severity: &Severity) -> Self {
        match severity {
            Severity::Critical | Severity::Error => Self("red"),
            Severity::Warning => Self("yellow"),
            Severity::Success => Self("green"),
            Severity::Info => Self("blue"),
            Severity::Debug => Self("gray"),
            Severity::Custom(_) => Self::DEFAULT,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_parse_standard_levels_case_insensitive() {
        assert_eq!(Severity::parse("ERROR"), Severity::Error);
        assert_eq!(Severity::parse(" Warning "), Severity::Warning);
        assert_eq!(Severity::parse("debug"), Severity::Debug);
    }

    #[test]
    fn test_severity_blank_defaults_to_info() {
        assert_eq!(Severity::parse(""), Severity::Info);
        assert_eq!(Severity::parse("   "), Severity::Info);
    }

    #[test]
    fn test_severity_custom_kept_verbatim() {
        let severity = Severity::parse("Notice");
        assert_eq!(severity, Severity::Custom("Notice".into()));
        assert_eq!(severity.as_str(), "Notice");
        assert!(!severity.is_standard());
    }

    #[test]
    fn test_severity_serde_as_string() {
        let json = serde_json::to_string(&Severity::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
        let back: Severity = serde_json::from_str("\"audit\"").unwrap();
        assert_eq!(back, Severity::Custom("audit".into()));
    }

    #[test]
    fn test_category_parse_falls_back_to_general() {
        assert_eq!(Category::parse("HTTP"), Category::Http);
        assert_eq!(Category::parse("unknown"), Category::General);
    }

    #[test]
    fn test_color_parse_is_case_insensitive() {
        assert_eq!(Color::parse("Emerald").map(Color::as_str), Some("emerald"));
        assert_eq!(Color::parse("ROSE").map(Color::as_str), Some("rose"));
    }

    #[test]
    fn test_color_parse_rejects_off_palette() {
        assert!(Color::parse("magenta").is_none());
        assert!(Color::parse("").is_none());
    }

    #[test]
    fn test_color_for_severity() {
        assert_eq!(Color::for_severity(&Severity::Critical).as_str(), "red");
        assert_eq!(Color::for_severity(&Severity::Error).as_str(), "red");
        assert_eq!(Color::for_severity(&Severity::Warning).as_str(), "yellow");
        assert_eq!(Color::for_severity(&Severity::Success).as_str(), "green");
        assert_eq!(Color::for_severity(&Severity::Info).as_str(), "blue");
        assert_eq!(Color::for_severity(&Severity::Debug).as_str(), "gray");
        assert_eq!(
            Color::for_severity(&Severity::Custom("audit".into())),
            Color::DEFAULT
        );
    }
}
