use serde::{Deserialize, Deserializer};
use tracing::warn;

/// Severity of a single finding, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Parse a severity string leniently. Unrecognized or oddly-cased values
    /// fall back to `Medium` so a misclassified finding is downgraded, never
    /// dropped.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "medium" => Severity::Medium,
            "low" => Severity::Low,
            other => {
                warn!(severity = other, "unrecognized severity, defaulting to medium");
                Severity::Medium
            }
        }
    }

    /// Whether this severity blocks the change set.
    pub fn is_blocking(self) -> bool {
        matches!(self, Severity::Critical | Severity::High)
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Severity::parse_lenient(&raw))
    }
}

/// Display labels per severity. Carried in config rather than hardcoded so
/// the dispatcher stays free of hidden state.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SeverityLabels {
    pub critical: String,
    pub high: String,
    pub medium: String,
    pub low: String,
}

impl Default for SeverityLabels {
    fn default() -> Self {
        Self {
            critical: "CRITICAL".to_string(),
            high: "HIGH".to_string(),
            medium: "MEDIUM".to_string(),
            low: "LOW".to_string(),
        }
    }
}

impl SeverityLabels {
    pub fn label(&self, severity: Severity) -> &str {
        match severity {
            Severity::Critical => &self.critical,
            Severity::High => &self.high,
            Severity::Medium => &self.medium,
            Severity::Low => &self.low,
        }
    }
}

/// One issue reported by the analysis backend for a specific file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    /// Relative path of the file the finding is about.
    pub filename: String,
    /// 1-based line in the file's current revision, if one applies.
    pub line: Option<u32>,
    pub severity: Severity,
    pub message: String,
}

/// Drop findings that are missing a filename or message. Such entries cannot
/// be matched or posted; they are logged and discarded here so downstream
/// stages only ever see well-formed findings.
pub fn sanitize(findings: Vec<Finding>) -> Vec<Finding> {
    findings
        .into_iter()
        .filter(|f| {
            if f.filename.trim().is_empty() {
                warn!(message = %f.message, "dropping finding without a filename");
                return false;
            }
            if f.message.trim().is_empty() {
                warn!(filename = %f.filename, "dropping finding without a message");
                return false;
            }
            true
        })
        .map(|mut f| {
            // Line 0 is not addressable on any review surface.
            if f.line == Some(0) {
                f.line = None;
            }
            f
        })
        .collect()
}
