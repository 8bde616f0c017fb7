pub mod github;

use crate::dispatch::Verdict;
use crate::error::Result;
use crate::reconcile::OpenThread;

/// One file touched by the change set, as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedFile {
    pub filename: String,
    /// Unified diff for the file; very large or binary files have none.
    pub patch: Option<String>,
    pub status: String,
}

impl ChangedFile {
    /// Deleted files have nothing left to review.
    pub fn is_removed(&self) -> bool {
        self.status == "removed"
    }
}

/// The code-hosting collaborator: supplies the change set and review state,
/// accepts resolve and post commands. The engine itself never talks to the
/// network; everything host-shaped goes through this trait.
pub trait ReviewHost {
    fn fetch_changed_files(&self, pr_number: u64) -> Result<Vec<ChangedFile>>;

    /// Head commit of the change set, used to fetch file contents.
    fn fetch_head_sha(&self, pr_number: u64) -> Result<String>;

    fn fetch_file_content(&self, path: &str, git_ref: &str) -> Result<String>;

    /// Unresolved review threads currently open on the change set.
    fn fetch_open_threads(&self, pr_number: u64) -> Result<Vec<OpenThread>>;

    /// Close one thread. Terminal; a resolved thread never comes back.
    fn resolve_thread(&self, thread_id: &str) -> Result<()>;

    /// Post a blocking or advisory review with one comment per finding.
    /// Implementations fall back to a general comment when the host rejects
    /// line-anchored ones. A `ReviewAction::None` verdict posts nothing.
    fn post_review(&self, pr_number: u64, verdict: &Verdict) -> Result<()>;
}
