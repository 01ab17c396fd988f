//! Rule tables consulted by the classifier.
//!
//! Every table is an ordered list evaluated first-match-wins. The built-in
//! tables below are loaded once into a [`Rules`] value; callers may build a
//! substitute set by editing the public fields.

use regex::Regex;

use crate::domain::{Category, Severity};
use crate::error::ScribeError;

/// Substring pattern mapped to a severity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternRule {
    pub pattern: String,
    pub severity: Severity,
}

/// Keyword conditions that name the service a log most likely came from.
///
/// Matches when at least one `any_of` keyword is present (or the list is
/// empty), every `all_of` keyword is present and no `none_of` keyword is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRule {
    pub service: String,
    pub any_of: Vec<String>,
    pub all_of: Vec<String>,
    pub none_of: Vec<String>,
}

impl ServiceRule {
    #[must_use]
    pub fn matches(&self, text_lower: &str) -> bool {
        let any = self.any_of.is_empty() || self.any_of.iter().any(|k| text_lower.contains(k.as_str()));
        any && self.all_of.iter().all(|k| text_lower.contains(k.as_str()))
            && !self.none_of.iter().any(|k| text_lower.contains(k.as_str()))
    }
}

/// Duration buckets in milliseconds: below `fast_ms` is fast, below
/// `normal_ms` normal, below `slow_ms` slow, anything else critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationThresholds {
    pub fast_ms: u64,
    pub normal_ms: u64,
    pub slow_ms: u64,
}

impl DurationThresholds {
    #[must_use]
    pub fn severity_for(&self, duration_ms: u64) -> Severity {
        if duration_ms < self.fast_ms {
            Severity::Success
        } else if duration_ms < self.normal_ms {
            Severity::Info
        } else if duration_ms < self.slow_ms {
            Severity::Warning
        } else {
            Severity::Error
        }
    }
}

/// Immutable classification rule registry.
#[derive(Debug, Clone)]
pub struct Rules {
    pub security: Vec<String>,
    pub business: Vec<PatternRule>,
    pub performance: Vec<PatternRule>,
    pub duration_fields: Vec<String>,
    pub duration_thresholds: DurationThresholds,
    pub http_status_patterns: Vec<Regex>,
    pub http_status_severity: Vec<(u16, Severity)>,
    pub stack_trace_indicators: Vec<String>,
    pub database: Vec<PatternRule>,
    /// Matched case-sensitively against the raw text.
    pub system_codes: Vec<PatternRule>,
    /// Keyword buckets in priority order.
    pub keyword_buckets: Vec<(Severity, Vec<String>)>,
    /// Category keywords in priority order, consulted after the security list.
    pub category_keywords: Vec<(Category, Vec<String>)>,
    pub source_fields: Vec<String>,
    pub services: Vec<ServiceRule>,
}

impl Rules {
    /// The built-in rule set.
    pub fn builtin() -> Result<Self, ScribeError> {
        let http_status_patterns = HTTP_STATUS_PATTERNS
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    ScribeError::Internal(format!("invalid status pattern {pattern}: {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            security: strings(SECURITY_PATTERNS),
            business: pattern_rules(BUSINESS_PATTERNS),
            performance: pattern_rules(PERFORMANCE_PATTERNS),
            duration_fields: strings(DURATION_FIELDS),
            duration_thresholds: DurationThresholds {
                fast_ms: 100,
                normal_ms: 1000,
                slow_ms: 3000,
            },
            http_status_patterns,
            http_status_severity: HTTP_STATUS_SEVERITY.to_vec(),
            stack_trace_indicators: strings(STACK_TRACE_INDICATORS),
            database: pattern_rules(DATABASE_PATTERNS),
            system_codes: pattern_rules(SYSTEM_ERROR_CODES),
            keyword_buckets: vec![
                (Severity::Error, strings(ERROR_KEYWORDS)),
                (Severity::Warning, strings(WARNING_KEYWORDS)),
                (Severity::Success, strings(SUCCESS_KEYWORDS)),
                (Severity::Debug, strings(DEBUG_KEYWORDS)),
            ],
            category_keywords: CATEGORY_KEYWORDS
                .iter()
                .map(|(category, keywords)| (*category, strings(keywords)))
                .collect(),
            source_fields: strings(SOURCE_FIELDS),
            services: service_rules(),
        })
    }

    #[must_use]
    pub fn status_severity(&self, code: u16) -> Option<&Severity> {
        self.http_status_severity
            .iter()
            .find(|(candidate, _)| *candidate == code)
            .map(|(_, severity)| severity)
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

fn pattern_rules(items: &[(&str, Severity)]) -> Vec<PatternRule> {
    items
        .iter()
        .map(|(pattern, severity)| PatternRule {
            pattern: (*pattern).to_owned(),
            severity: severity.clone(),
        })
        .collect()
}

fn service(name: &str, any_of: &[&str]) -> ServiceRule {
    ServiceRule {
        service: name.to_owned(),
        any_of: strings(any_of),
        all_of: Vec::new(),
        none_of: Vec::new(),
    }
}

const SECURITY_PATTERNS: &[&str] = &[
    "unauthorized",
    "forbidden",
    "auth failed",
    "authentication failed",
    "permission denied",
    "access denied",
    "invalid token",
    "token expired",
    "session expired",
    "breach",
    "leaked",
    "exposed",
    "vulnerability",
    "injection",
    "xss",
    "csrf",
    "compromised",
    "malicious",
    "exploit",
    "brute force",
    "ddos",
    "flooding",
    "suspicious",
    "intrusion",
    "sql injection",
    "code injection",
    "command injection",
];

const BUSINESS_PATTERNS: &[(&str, Severity)] = &[
    ("payment failed", Severity::Error),
    ("payment successful", Severity::Success),
    ("payment pending", Severity::Info),
    ("payment declined", Severity::Error),
    ("payment processed", Severity::Success),
    ("order completed", Severity::Success),
    ("order canceled", Severity::Warning),
    ("order failed", Severity::Error),
    ("order placed", Severity::Success),
    ("order refunded", Severity::Info),
    ("subscription expired", Severity::Warning),
    ("subscription renewed", Severity::Success),
    ("subscription canceled", Severity::Warning),
    ("subscription activated", Severity::Success),
    ("trial expired", Severity::Info),
    ("trial started", Severity::Success),
    ("invoice overdue", Severity::Warning),
    ("invoice paid", Severity::Success),
    ("invoice sent", Severity::Info),
    ("refund processed", Severity::Info),
    ("refund failed", Severity::Error),
    ("refund requested", Severity::Info),
    ("user registered", Severity::Success),
    ("user deleted", Severity::Warning),
    ("user deactivated", Severity::Warning),
    ("user activated", Severity::Success),
    ("login successful", Severity::Success),
    ("login failed", Severity::Warning),
    ("logout successful", Severity::Info),
    ("password changed", Severity::Info),
    ("password reset", Severity::Info),
    ("cart abandoned", Severity::Warning),
    ("cart updated", Severity::Info),
    ("checkout started", Severity::Info),
    ("checkout completed", Severity::Success),
];

const PERFORMANCE_PATTERNS: &[(&str, Severity)] = &[
    ("slow query", Severity::Warning),
    ("query timeout", Severity::Error),
    ("request timeout", Severity::Error),
    ("connection timeout", Severity::Error),
    ("high latency", Severity::Warning),
    ("memory pressure", Severity::Warning),
    ("cpu spike", Severity::Warning),
    ("disk full", Severity::Critical),
    ("rate limited", Severity::Warning),
    ("throttled", Severity::Warning),
    ("bottleneck", Severity::Warning),
    ("degraded", Severity::Warning),
];

const DURATION_FIELDS: &[&str] = &[
    "duration",
    "duration_ms",
    "elapsed",
    "elapsed_ms",
    "time_ms",
    "latency",
    "latency_ms",
];

const HTTP_STATUS_PATTERNS: &[&str] = &[
    r"(?i)(?:status|http|code)[\s:=]*([0-9]{3})",
    r"(?i)returned\s+([0-9]{3})",
    r"(?i)\b([0-9]{3})\s+(?:error|ok|found|not found)",
    r#"(?i)"status"[\s:]+["']?([0-9]{3})"#,
    r#"(?i)"status_code"[\s:]+["']?([0-9]{3})"#,
];

const HTTP_STATUS_SEVERITY: &[(u16, Severity)] = &[
    (200, Severity::Success),
    (201, Severity::Success),
    (202, Severity::Success),
    (204, Severity::Success),
    (301, Severity::Info),
    (302, Severity::Info),
    (304, Severity::Info),
    (400, Severity::Warning),
    (401, Severity::Error),
    (403, Severity::Error),
    (404, Severity::Warning),
    (405, Severity::Warning),
    (408, Severity::Warning),
    (409, Severity::Warning),
    (410, Severity::Warning),
    (413, Severity::Warning),
    (422, Severity::Warning),
    (429, Severity::Warning),
    (500, Severity::Error),
    (501, Severity::Error),
    (502, Severity::Error),
    (503, Severity::Critical),
    (504, Severity::Critical),
    (507, Severity::Critical),
    (511, Severity::Error),
];

const STACK_TRACE_INDICATORS: &[&str] = &[
    " at line ",
    " at Object.",
    "Traceback",
    "goroutine ",
    "panic:",
    ".java:",
    ".py:",
    ".js:",
    ".go:",
    "at /",
    "File \"",
    " line ",
    "in <module>",
    "Exception in thread",
    "Caused by:",
    "\n\tat ",
    "Call Stack:",
    "Stack trace:",
    "at Function.",
];

const DATABASE_PATTERNS: &[(&str, Severity)] = &[
    ("deadlock", Severity::Critical),
    ("connection pool exhausted", Severity::Critical),
    ("too many connections", Severity::Critical),
    ("duplicate key", Severity::Warning),
    ("constraint violation", Severity::Error),
    ("foreign key violation", Severity::Error),
    ("unique constraint", Severity::Warning),
    ("table locked", Severity::Warning),
    ("database locked", Severity::Warning),
    ("sqlite_busy", Severity::Warning),
    ("sqlite_locked", Severity::Warning),
    ("sqlite_corrupt", Severity::Critical),
    ("connection refused", Severity::Error),
    ("connection timeout", Severity::Error),
    ("query timeout", Severity::Warning),
];

const SYSTEM_ERROR_CODES: &[(&str, Severity)] = &[
    ("ECONNREFUSED", Severity::Error),
    ("ETIMEDOUT", Severity::Error),
    ("ENOTFOUND", Severity::Error),
    ("ECONNRESET", Severity::Error),
    ("EPIPE", Severity::Error),
    ("EACCES", Severity::Error),
    ("ENOENT", Severity::Warning),
    ("EISDIR", Severity::Error),
    ("EMFILE", Severity::Critical),
    ("ENOMEM", Severity::Critical),
    ("ENOSPC", Severity::Critical),
    ("EIO", Severity::Critical),
    ("EROFS", Severity::Error),
];

const ERROR_KEYWORDS: &[&str] = &[
    "error", "failed", "failure", "fatal", "critical", "crash", "exception", "panic", "abort",
    "aborted", "refused", "denied", "reject", "rejected", "timeout", "timed out", "unavailable",
    "unreachable", "invalid", "corrupt", "corrupted", "broken", "violation", "exceeded",
    "overflow", "underflow", "leak", "died", "dying", "dump", "dumped", "fault", "faulted",
    "kill", "killed", "terminate", "terminated", "segfault", "segmentation", "core dump",
    "stack overflow", "out of memory", "oom", "cannot", "could not", "unable", "impossible",
];

const WARNING_KEYWORDS: &[&str] = &[
    "warning", "warn", "deprecated", "deprecation", "slow", "slower", "delay", "delayed", "lag",
    "lagging", "retry", "retrying", "retried", "pending", "blocked", "blocking", "queue full",
    "high load", "degraded", "flaky", "unstable", "intermittent", "occasional", "sometimes",
    "timeout soon",
];

const SUCCESS_KEYWORDS: &[&str] = &[
    "success", "successful", "successfully", "succeeded", "complete", "completed", "done",
    "finished", "processed", "created", "updated", "saved", "stored", "published", "deployed",
    "approved", "accepted", "validated", "verified", "confirmed", "established", "connected",
    "ready", "available", "online", "restored", "recovered", "fixed", "resolved", "passed", "ok",
    "okay", "working", "operational", "healthy",
];

const DEBUG_KEYWORDS: &[&str] = &[
    "debug", "debugging", "trace", "tracing", "verbose", "entering", "entered", "exiting",
    "exited", "calling", "called", "executing", "executed", "invoking", "invoked", "beginning",
    "starting", "stopping", "ended",
];

const CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::Http,
        &["http", "request", "response", "status", "endpoint", "api", "rest", "graphql"],
    ),
    (
        Category::Database,
        &["database", "sql", "query", "table", "postgres", "mysql", "mongo", "redis", "sqlite"],
    ),
    (
        Category::Performance,
        &["slow", "timeout", "latency", "performance", "memory", "cpu", "disk", "duration"],
    ),
    (
        Category::Business,
        &["payment", "order", "invoice", "subscription", "user", "login", "checkout", "cart"],
    ),
    (
        Category::System,
        &["system", "kernel", "process", "signal", "daemon", "service", "cron", "scheduler"],
    ),
];

const SOURCE_FIELDS: &[&str] = &["service", "source", "app", "application", "component", "module"];

const DATABASE_WORDS: &[&str] = &["database", "sql", "query", "table"];

fn service_rules() -> Vec<ServiceRule> {
    let vendor = |name: &str, keyword: &str| ServiceRule {
        service: name.to_owned(),
        any_of: strings(DATABASE_WORDS),
        all_of: vec![keyword.to_owned()],
        none_of: Vec::new(),
    };

    vec![
        vendor("postgresql-db", "postgres"),
        vendor("mysql-db", "mysql"),
        vendor("mongodb", "mongo"),
        vendor("redis-cache", "redis"),
        vendor("sqlite-db", "sqlite"),
        service("database-service", DATABASE_WORDS),
        service("auth-service", &["login", "auth", "token", "session", "jwt", "oauth"]),
        service(
            "payment-service",
            &["payment", "stripe", "paypal", "billing", "invoice", "checkout"],
        ),
        service(
            "email-service",
            &["email", "smtp", "notification", "mailgun", "sendgrid", "push notification"],
        ),
        service("api-gateway", &["api gateway", "endpoint", "route", "/api/"]),
        ServiceRule {
            service: "user-service".to_owned(),
            any_of: strings(&["profile", "register", "account", "signup"]),
            all_of: vec!["user".to_owned()],
            none_of: Vec::new(),
        },
        service("order-service", &["order", "cart", "inventory", "product", "catalog"]),
        service(
            "file-service",
            &["file", "upload", "download", "s3", "storage", "blob", "bucket"],
        ),
        service(
            "search-service",
            &["search", "elasticsearch", "solr", "algolia", "opensearch"],
        ),
        service(
            "monitoring-service",
            &["health", "monitor", "metrics", "prometheus", "grafana", "datadog"],
        ),
        service(
            "load-balancer",
            &["load balan", "nginx", "haproxy", "upstream", "reverse proxy"],
        ),
        ServiceRule {
            service: "cache-service".to_owned(),
            any_of: Vec::new(),
            all_of: vec!["cache".to_owned()],
            none_of: vec!["redis".to_owned()],
        },
        service(
            "queue-service",
            &["queue", "rabbitmq", "kafka", "sqs", "pubsub", "message broker"],
        ),
        service(
            "config-service",
            &["config", "setting", "environment", "feature flag"],
        ),
        service("backup-service", &["backup", "restore", "archive", "snapshot"]),
        service(
            "reporting-service",
            &["report", "analytics", "dashboard", "bi ", "business intelligence"],
        ),
        service(
            "deployment-service",
            &["deploy", "build", "pipeline", "docker", "kubernetes", "k8s", "ci/cd"],
        ),
        service(
            "cdn-service",
            &["cdn", "cloudflare", "fastly", "akamai", "static asset"],
        ),
        service(
            "scheduler-service",
            &["cron", "scheduler", "scheduled task", "job runner"],
        ),
        service("webhook-service", &["webhook", "callback", "hook endpoint"]),
    ]
}
