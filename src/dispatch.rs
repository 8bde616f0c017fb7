use crate::findings::{Finding, SeverityLabels};

/// Aggregate action to take for a change set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewAction {
    /// Blocking review: at least one critical or high finding.
    RequestChanges,
    /// Advisory review: only medium/low findings.
    Comment,
    /// Nothing to report.
    None,
}

impl ReviewAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewAction::RequestChanges => "request_changes",
            ReviewAction::Comment => "comment",
            ReviewAction::None => "none",
        }
    }
}

/// A finding ready for display, with its severity label attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedFinding {
    pub finding: Finding,
    pub label: String,
}

/// The dispatcher's output: the chosen action plus the findings to post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub action: ReviewAction,
    pub findings: Vec<AnnotatedFinding>,
}

/// Pick a verdict from a finding set.
///
/// Empty input means nothing to post. Otherwise the review blocks when any
/// finding is critical or high, and is advisory otherwise. Findings keep
/// their input order; no re-sorting. Pure and deterministic.
pub fn decide(findings: &[Finding], labels: &SeverityLabels) -> Verdict {
    if findings.is_empty() {
        return Verdict {
            action: ReviewAction::None,
            findings: Vec::new(),
        };
    }

    let has_blocking = findings.iter().any(|f| f.severity.is_blocking());
    let action = if has_blocking {
        ReviewAction::RequestChanges
    } else {
        ReviewAction::Comment
    };

    let findings = findings
        .iter()
        .map(|f| AnnotatedFinding {
            finding: f.clone(),
            label: labels.label(f.severity).to_string(),
        })
        .collect();

    Verdict { action, findings }
}
