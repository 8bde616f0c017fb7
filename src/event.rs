use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// The change set a review pass operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewTarget {
    pub owner: String,
    pub repo: String,
    pub pr_number: u64,
}

impl ReviewTarget {
    /// `owner/repo` as used in REST paths.
    pub fn nwo(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

#[derive(Debug, Deserialize)]
struct EventPayload {
    pull_request: Option<PullRequestRef>,
    repository: Option<RepositoryRef>,
}

#[derive(Debug, Deserialize)]
struct PullRequestRef {
    number: u64,
}

#[derive(Debug, Deserialize)]
struct RepositoryRef {
    full_name: String,
}

/// Read a GitHub Actions event payload and extract the review target.
///
/// Non-PR events are an error: the caller should skip the pass rather than
/// guess at a change set.
pub fn load_review_target(path: &Path) -> Result<ReviewTarget> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Event(format!("failed to read event file {}: {e}", path.display())))?;

    let payload: EventPayload = serde_json::from_str(&content)
        .map_err(|e| Error::Event(format!("failed to parse event payload: {e}")))?;

    let Some(pull_request) = payload.pull_request else {
        return Err(Error::Event("not a pull_request event".to_string()));
    };

    let Some(repository) = payload.repository else {
        return Err(Error::Event("event payload has no repository".to_string()));
    };

    parse_target(&repository.full_name, pull_request.number)
}

fn parse_target(full_name: &str, pr_number: u64) -> Result<ReviewTarget> {
    let Some((owner, repo)) = full_name.split_once('/') else {
        return Err(Error::Event(format!(
            "invalid repository name: {full_name}"
        )));
    };
    if owner.is_empty() || repo.is_empty() {
        return Err(Error::Event(format!(
            "invalid repository name: {full_name}"
        )));
    }
    Ok(ReviewTarget {
        owner: owner.to_string(),
        repo: repo.to_string(),
        pr_number,
    })
}
