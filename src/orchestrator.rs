use std::thread;

use tracing::{info, warn};

use crate::analysis::{AnalysisBackend, ReviewInput};
use crate::config::Config;
use crate::dispatch::{self, ReviewAction};
use crate::eligibility;
use crate::error::{Error, Result};
use crate::findings;
use crate::hosts::{ChangedFile, ReviewHost};
use crate::reconcile::{self, ReconcileOutcome};

/// Cap on concurrent file-content fetches against the host.
const MAX_IN_FLIGHT_FETCHES: usize = 8;

/// What one review pass did, for logging and exit reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    pub action: ReviewAction,
    pub reported: usize,
    pub kept: usize,
    pub resolved: usize,
}

/// Drives one review pass: fetch, filter, analyze, reconcile, dispatch.
///
/// All engine stages are pure; this is the only place where their inputs and
/// outputs touch the collaborators.
pub struct Orchestrator<H, A> {
    host: H,
    backend: A,
    config: Config,
}

impl<H: ReviewHost + Sync, A: AnalysisBackend> Orchestrator<H, A> {
    pub fn new(host: H, backend: A, config: Config) -> Self {
        Self {
            host,
            backend,
            config,
        }
    }

    pub fn run_pass(&self, pr_number: u64) -> Result<PassSummary> {
        info!(pr_number, "starting review pass");

        // Both inputs are collected in full before reconciliation; the
        // engine never sees a partial snapshot.
        let host = &self.host;
        let (threads_result, files_result) = thread::scope(|s| {
            let threads = s.spawn(move || host.fetch_open_threads(pr_number));
            let files = s.spawn(move || host.fetch_changed_files(pr_number));
            (join_fetch(threads.join()), join_fetch(files.join()))
        });

        // Losing reconciliation is safer than losing visibility: with no
        // thread history, every new finding is simply reported.
        let open_threads = match threads_result {
            Ok(threads) => threads,
            Err(e) => {
                warn!(error = %e, "could not fetch open threads; reviewing without history");
                Vec::new()
            }
        };

        let changed = files_result?;
        let eligible: Vec<ChangedFile> = changed
            .into_iter()
            .filter(|f| !f.is_removed())
            .filter(|f| eligibility::is_eligible(&f.filename, &self.config.eligibility))
            .collect();

        let new_findings = if eligible.is_empty() {
            info!("no reviewable files in change set");
            Vec::new()
        } else {
            info!(count = eligible.len(), "analyzing changed files");
            let inputs = self.build_inputs(&eligible, pr_number)?;
            let raw = self
                .backend
                .review(&inputs, &self.config.analysis.project_context)?;
            findings::sanitize(raw)
        };

        let outcome = reconcile::reconcile(&open_threads, &new_findings, &self.config.bot_login);
        info!(
            kept = outcome.to_keep.len(),
            resolved = outcome.to_resolve.len(),
            reported = outcome.to_report.len(),
            "reconciled findings against open threads"
        );

        self.resolve_stale(&outcome);

        let verdict = dispatch::decide(&outcome.to_report, &self.config.labels);
        match verdict.action {
            ReviewAction::None => info!("no new findings to report"),
            action => {
                if self.config.dry_run {
                    info!(
                        action = action.as_str(),
                        count = verdict.findings.len(),
                        "dry-run: skipping review post"
                    );
                } else {
                    self.host.post_review(pr_number, &verdict)?;
                }
            }
        }

        Ok(PassSummary {
            action: verdict.action,
            reported: outcome.to_report.len(),
            kept: outcome.to_keep.len(),
            resolved: outcome.to_resolve.len(),
        })
    }

    fn build_inputs(&self, files: &[ChangedFile], pr_number: u64) -> Result<Vec<ReviewInput>> {
        let contents = if self.config.analysis.include_file_contents {
            self.fetch_contents(files, pr_number)?
        } else {
            vec![None; files.len()]
        };

        Ok(files
            .iter()
            .zip(contents)
            .map(|(file, content)| ReviewInput {
                filename: file.filename.clone(),
                patch: file.patch.clone().unwrap_or_default(),
                content,
            })
            .collect())
    }

    /// Fetch full file contents at the change set's head, at most
    /// [`MAX_IN_FLIGHT_FETCHES`] requests at a time. A file whose content
    /// cannot be fetched is reviewed from its patch alone.
    fn fetch_contents(&self, files: &[ChangedFile], pr_number: u64) -> Result<Vec<Option<String>>> {
        let head_sha = self.host.fetch_head_sha(pr_number)?;
        let host = &self.host;
        let mut contents = Vec::with_capacity(files.len());

        for batch in files.chunks(MAX_IN_FLIGHT_FETCHES) {
            let fetched: Vec<Option<String>> = thread::scope(|s| {
                let handles: Vec<_> = batch
                    .iter()
                    .map(|file| {
                        let head = &head_sha;
                        s.spawn(move || host.fetch_file_content(&file.filename, head))
                    })
                    .collect();

                handles
                    .into_iter()
                    .map(|handle| match handle.join() {
                        Ok(Ok(content)) => Some(content),
                        Ok(Err(e)) => {
                            warn!(error = %e, "could not fetch file content; using patch only");
                            None
                        }
                        Err(_) => {
                            warn!("content fetch worker panicked");
                            None
                        }
                    })
                    .collect()
            });
            contents.extend(fetched);
        }

        Ok(contents)
    }

    fn resolve_stale(&self, outcome: &ReconcileOutcome) {
        for stale in &outcome.to_resolve {
            if self.config.dry_run {
                info!(thread_id = %stale.id, "dry-run: skipping thread resolution");
                continue;
            }
            // A thread that fails to resolve stays open and gets another
            // chance next pass.
            if let Err(e) = self.host.resolve_thread(&stale.id) {
                warn!(thread_id = %stale.id, error = %e, "failed to resolve thread");
            }
        }
    }
}

fn join_fetch<T>(joined: thread::Result<Result<T>>) -> Result<T> {
    match joined {
        Ok(result) => result,
        Err(_) => Err(Error::Host("fetch worker panicked".to_string())),
    }
}
