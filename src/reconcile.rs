use crate::findings::Finding;

/// Maximum line distance (inclusive) at which a new finding is considered the
/// same issue as an earlier thread that has drifted with the diff.
pub const DRIFT_TOLERANCE: u32 = 3;

/// A previously posted, still-unresolved finding as tracked by the code host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenThread {
    /// Opaque host identifier, used only to issue a resolve.
    pub id: String,
    pub filename: String,
    /// `None` when the location the thread referred to no longer exists.
    pub line: Option<u32>,
    /// Login of whoever opened the thread.
    pub author: String,
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Threads whose issue is still detected; left open, not re-reported.
    pub to_keep: Vec<OpenThread>,
    /// Threads whose issue is no longer detected; to be closed.
    pub to_resolve: Vec<OpenThread>,
    /// Findings with no existing thread; to be posted.
    pub to_report: Vec<Finding>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ThreadFate {
    Kept,
    Resolved,
}

fn within_drift(thread_line: Option<u32>, finding_line: Option<u32>) -> bool {
    match (thread_line, finding_line) {
        (Some(t), Some(f)) => t.abs_diff(f) <= DRIFT_TOLERANCE,
        // A thread without a line can never be re-confirmed.
        _ => false,
    }
}

/// Match new findings against open threads and classify both sides.
///
/// Only threads authored by `bot_login` participate; threads from humans or
/// other tools are excluded from all three output sets. Matching is greedy
/// and first-found: each finding, in input order, claims the first unclaimed
/// thread with the same filename whose line is within [`DRIFT_TOLERANCE`].
/// When several threads are within tolerance the earliest one in input order
/// wins; this trades minimal total drift for determinism. O(N*M) over
/// findings and threads, which both stay in the tens in practice.
///
/// Pure: one pass over the inputs, no I/O, no retained state. Each thread
/// ends as kept or resolved, each finding as suppressed or reported.
pub fn reconcile(
    open_threads: &[OpenThread],
    new_findings: &[Finding],
    bot_login: &str,
) -> ReconcileOutcome {
    let own_threads: Vec<&OpenThread> = open_threads
        .iter()
        .filter(|t| t.author == bot_login)
        .collect();

    let mut fates: Vec<Option<ThreadFate>> = vec![None; own_threads.len()];
    let mut to_report = Vec::new();

    for finding in new_findings {
        let matched = own_threads.iter().enumerate().position(|(i, thread)| {
            fates[i].is_none()
                && thread.filename == finding.filename
                && within_drift(thread.line, finding.line)
        });

        match matched {
            // Already visible via the existing thread; suppress the finding.
            Some(i) => fates[i] = Some(ThreadFate::Kept),
            None => to_report.push(finding.clone()),
        }
    }

    let mut to_keep = Vec::new();
    let mut to_resolve = Vec::new();
    for (thread, fate) in own_threads.iter().zip(&fates) {
        match fate.unwrap_or(ThreadFate::Resolved) {
            ThreadFate::Kept => to_keep.push((*thread).clone()),
            ThreadFate::Resolved => to_resolve.push((*thread).clone()),
        }
    }

    ReconcileOutcome {
        to_keep,
        to_resolve,
        to_report,
    }
}
