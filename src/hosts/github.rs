use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::dispatch::{AnnotatedFinding, ReviewAction, Verdict};
use crate::error::{Error, Result};
use crate::event::ReviewTarget;
use crate::reconcile::OpenThread;

use super::{ChangedFile, ReviewHost};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;

/// A GraphQL variable as passed to `gh api graphql`.
pub enum GraphQlVar<'a> {
    Str(&'a str, &'a str),
    Int(&'a str, u64),
}

/// Abstraction over `gh` CLI execution for testability.
pub trait GhClient: Send + Sync {
    fn run(&self, args: &[&str]) -> Result<String>;

    /// Run with a payload piped to stdin (for `--input -` API calls).
    fn run_with_stdin(&self, args: &[&str], stdin: &str) -> Result<String>;

    /// Run a GraphQL query via `gh api graphql`.
    fn graphql(&self, query: &str, variables: &[GraphQlVar]) -> Result<String> {
        let query_arg = format!("query={query}");
        let mut owned: Vec<String> = vec!["api".into(), "graphql".into(), "-f".into(), query_arg];
        for variable in variables {
            match variable {
                GraphQlVar::Str(key, value) => {
                    owned.push("-f".into());
                    owned.push(format!("{key}={value}"));
                }
                GraphQlVar::Int(key, value) => {
                    owned.push("-F".into());
                    owned.push(format!("{key}={value}"));
                }
            }
        }
        let refs: Vec<&str> = owned.iter().map(|s| s.as_str()).collect();
        self.run(&refs)
    }
}

/// Real `gh` CLI client with retry and exponential backoff.
struct DefaultGhClient;

impl DefaultGhClient {
    fn execute(args: &[&str], stdin: Option<&str>) -> Result<String> {
        let mut cmd = Command::new("gh");
        cmd.args(args);
        cmd.stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Host(format!("failed to run gh: {e}")))?;

        if let Some(data) = stdin
            && let Some(mut pipe) = child.stdin.take()
        {
            pipe.write_all(data.as_bytes())
                .map_err(|e| Error::Host(format!("failed to write gh stdin: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| Error::Host(format!("failed to wait for gh: {e}")))?;

        if output.status.success() {
            String::from_utf8(output.stdout)
                .map_err(|e| Error::Host(format!("invalid utf8 from gh: {e}")))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(Error::Host(format!("gh failed: {stderr}")))
        }
    }
}

impl GhClient for DefaultGhClient {
    fn run(&self, args: &[&str]) -> Result<String> {
        retry_with_backoff(|| Self::execute(args, None))
    }

    fn run_with_stdin(&self, args: &[&str], stdin: &str) -> Result<String> {
        // Not retried: a review may have been created even when gh reports
        // an error, and double-posting is worse than one failed attempt.
        Self::execute(args, Some(stdin))
    }
}

pub struct GitHubHost {
    target: ReviewTarget,
    client: Box<dyn GhClient>,
}

impl GitHubHost {
    pub fn new(target: ReviewTarget) -> Self {
        Self {
            target,
            client: Box::new(DefaultGhClient),
        }
    }

    #[cfg(test)]
    fn with_client(target: ReviewTarget, client: Box<dyn GhClient>) -> Self {
        Self { target, client }
    }

    /// Build a review target for the repo `gh` resolves from the current
    /// directory, for runs outside a hosted workflow.
    pub fn current_repo_target(pr_number: u64) -> Result<ReviewTarget> {
        let json = DefaultGhClient.run(&["repo", "view", "--json", "owner,name"])?;
        let info: RepoInfo = serde_json::from_str(&json)
            .map_err(|e| Error::Host(format!("failed to parse repo info: {e}")))?;
        Ok(ReviewTarget {
            owner: info.owner.login,
            repo: info.name,
            pr_number,
        })
    }

    fn nwo(&self) -> String {
        self.target.nwo()
    }

    fn post_fallback_comment(&self, pr_number: u64, verdict: &Verdict) -> Result<()> {
        let mut body = String::from("Automated review (could not attach line comments):\n");
        for annotated in &verdict.findings {
            body.push_str(&format_finding_line(annotated));
            body.push('\n');
        }

        let endpoint = format!("repos/{}/issues/{}/comments", self.nwo(), pr_number);
        let payload = serde_json::json!({ "body": body });
        self.client
            .run_with_stdin(&["api", &endpoint, "--input", "-"], &payload.to_string())?;
        info!(pr_number, "posted fallback review comment");
        Ok(())
    }
}

fn format_finding_line(annotated: &AnnotatedFinding) -> String {
    match annotated.finding.line {
        Some(line) => format!(
            "- **{}** `{}` L{}: {}",
            annotated.label, annotated.finding.filename, line, annotated.finding.message
        ),
        None => format!(
            "- **{}** `{}`: {}",
            annotated.label, annotated.finding.filename, annotated.finding.message
        ),
    }
}

impl ReviewHost for GitHubHost {
    fn fetch_changed_files(&self, pr_number: u64) -> Result<Vec<ChangedFile>> {
        let endpoint = format!("repos/{}/pulls/{}/files", self.nwo(), pr_number);
        let json = self.client.run(&["api", &endpoint, "--paginate"])?;

        let files: Vec<ApiFile> = serde_json::from_str(&json)
            .map_err(|e| Error::Host(format!("failed to parse changed files: {e}")))?;

        let changed: Vec<ChangedFile> = files
            .into_iter()
            .map(|f| ChangedFile {
                filename: f.filename,
                patch: f.patch,
                status: f.status,
            })
            .collect();

        debug!(count = changed.len(), "fetched changed files");
        Ok(changed)
    }

    fn fetch_head_sha(&self, pr_number: u64) -> Result<String> {
        let endpoint = format!("repos/{}/pulls/{}", self.nwo(), pr_number);
        let json = self.client.run(&["api", &endpoint])?;
        let info: PrInfo = serde_json::from_str(&json)
            .map_err(|e| Error::Host(format!("failed to parse pull request: {e}")))?;
        Ok(info.head.sha)
    }

    fn fetch_file_content(&self, path: &str, git_ref: &str) -> Result<String> {
        let endpoint = format!("repos/{}/contents/{}?ref={}", self.nwo(), path, git_ref);
        self.client.run(&[
            "api",
            &endpoint,
            "-H",
            "Accept: application/vnd.github.raw",
        ])
    }

    fn fetch_open_threads(&self, pr_number: u64) -> Result<Vec<OpenThread>> {
        let query = r#"
            query($owner: String!, $repo: String!, $prNumber: Int!) {
              repository(owner: $owner, name: $repo) {
                pullRequest(number: $prNumber) {
                  reviewThreads(last: 50) {
                    nodes {
                      id
                      isResolved
                      comments(first: 1) {
                        nodes {
                          author { login }
                          path
                          line
                        }
                      }
                    }
                  }
                }
              }
            }
        "#;

        let response = self.client.graphql(
            query,
            &[
                GraphQlVar::Str("owner", &self.target.owner),
                GraphQlVar::Str("repo", &self.target.repo),
                GraphQlVar::Int("prNumber", pr_number),
            ],
        )?;

        let parsed: GqlResponse = serde_json::from_str(&response)
            .map_err(|e| Error::Host(format!("failed to parse review threads: {e}")))?;

        let Some(pull_request) = parsed.data.repository.pull_request else {
            warn!(pr_number, "pull request not found in thread query");
            return Ok(Vec::new());
        };

        let mut threads = Vec::new();
        for node in pull_request.review_threads.nodes {
            if node.is_resolved {
                continue;
            }
            // Attribution comes from the thread's first comment; a thread
            // with no comment or a deleted author cannot be attributed.
            let Some(first) = node.comments.nodes.into_iter().next() else {
                continue;
            };
            let Some(author) = first.author else {
                continue;
            };
            threads.push(OpenThread {
                id: node.id,
                filename: first.path,
                line: first.line,
                author: author.login,
            });
        }

        debug!(count = threads.len(), "fetched open review threads");
        Ok(threads)
    }

    fn resolve_thread(&self, thread_id: &str) -> Result<()> {
        let mutation = r#"
            mutation ResolveThread($threadId: ID!) {
              resolveReviewThread(input: {threadId: $threadId}) {
                thread { isResolved }
              }
            }
        "#;

        self.client
            .graphql(mutation, &[GraphQlVar::Str("threadId", thread_id)])?;
        debug!(thread_id, "resolved review thread");
        Ok(())
    }

    fn post_review(&self, pr_number: u64, verdict: &Verdict) -> Result<()> {
        let event = match verdict.action {
            ReviewAction::RequestChanges => "REQUEST_CHANGES",
            ReviewAction::Comment => "COMMENT",
            ReviewAction::None => return Ok(()),
        };

        let (anchored, general): (Vec<&AnnotatedFinding>, Vec<&AnnotatedFinding>) = verdict
            .findings
            .iter()
            .partition(|a| a.finding.line.is_some());

        let mut body = format!(
            "Automated review: {} issue(s) found.",
            verdict.findings.len()
        );
        // Findings with no usable line go into the review body.
        for annotated in &general {
            body.push('\n');
            body.push_str(&format_finding_line(annotated));
        }

        let comments: Vec<serde_json::Value> = anchored
            .iter()
            .map(|a| {
                serde_json::json!({
                    "path": a.finding.filename,
                    "line": a.finding.line,
                    "side": "RIGHT",
                    "body": format!("**{}**: {}", a.label, a.finding.message),
                })
            })
            .collect();

        let endpoint = format!("repos/{}/pulls/{}/reviews", self.nwo(), pr_number);
        let payload = serde_json::json!({
            "event": event,
            "body": body,
            "comments": comments,
        });

        match self
            .client
            .run_with_stdin(&["api", &endpoint, "--input", "-"], &payload.to_string())
        {
            Ok(_) => {
                info!(pr_number, event, count = verdict.findings.len(), "posted review");
                Ok(())
            }
            Err(e) => {
                // Line anchors the host refuses (e.g. lines outside the
                // diff) fail the whole review; degrade to a plain comment
                // so the findings stay visible.
                warn!(error = %e, "review rejected by host, falling back to general comment");
                self.post_fallback_comment(pr_number, verdict)
            }
        }
    }
}

// --- REST/GraphQL response types ---

#[derive(Debug, Deserialize)]
struct RepoInfo {
    name: String,
    owner: RepoOwner,
}

#[derive(Debug, Deserialize)]
struct RepoOwner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct ApiFile {
    filename: String,
    status: String,
    #[serde(default)]
    patch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PrInfo {
    head: PrHead,
}

#[derive(Debug, Deserialize)]
struct PrHead {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GqlResponse {
    data: GqlData,
}

#[derive(Debug, Deserialize)]
struct GqlData {
    repository: GqlRepository,
}

#[derive(Debug, Deserialize)]
struct GqlRepository {
    #[serde(rename = "pullRequest")]
    pull_request: Option<GqlPullRequest>,
}

#[derive(Debug, Deserialize)]
struct GqlPullRequest {
    #[serde(rename = "reviewThreads")]
    review_threads: GqlThreadConnection,
}

#[derive(Debug, Deserialize, Default)]
struct GqlThreadConnection {
    #[serde(default)]
    nodes: Vec<GqlThread>,
}

#[derive(Debug, Deserialize)]
struct GqlThread {
    id: String,
    #[serde(rename = "isResolved")]
    is_resolved: bool,
    comments: GqlCommentConnection,
}

#[derive(Debug, Deserialize, Default)]
struct GqlCommentConnection {
    #[serde(default)]
    nodes: Vec<GqlComment>,
}

#[derive(Debug, Deserialize)]
struct GqlComment {
    author: Option<GqlAuthor>,
    path: String,
    line: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GqlAuthor {
    login: String,
}

fn retry_with_backoff<F, T>(f: F) -> Result<T>
where
    F: Fn() -> Result<T>,
{
    retry_with_backoff_ms(f, INITIAL_BACKOFF_MS, MAX_RETRIES)
}

fn retry_with_backoff_ms<F, T>(f: F, initial_backoff_ms: u64, max_retries: u32) -> Result<T>
where
    F: Fn() -> Result<T>,
{
    let mut backoff_ms = initial_backoff_ms;

    for attempt in 1..=max_retries {
        match f() {
            Ok(val) => return Ok(val),
            Err(e) if attempt < max_retries => {
                warn!(attempt, error = %e, backoff_ms, "retrying after transient error");
                thread::sleep(Duration::from_millis(backoff_ms));
                backoff_ms *= 2;
            }
            Err(e) => return Err(e),
        }
    }

    unreachable!()
}
