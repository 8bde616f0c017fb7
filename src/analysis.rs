use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::AnalysisConfig;
use crate::error::{Error, Result};
use crate::findings::{Finding, Severity};
use crate::prompts::PromptEngine;

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;

const SYSTEM_PROMPT: &str =
    "You are a strict code reviewer. Always respond with a pure JSON list, no markdown formatting.";

/// One changed file as handed to the analysis backend.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReviewInput {
    pub filename: String,
    pub patch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

pub trait AnalysisBackend {
    /// Analyze a bundle of changed files and return the findings.
    ///
    /// Implementations must tolerate malformed backend output: unusable
    /// entries are dropped, an unusable response is zero findings. Transport
    /// failures are errors.
    fn review(&self, files: &[ReviewInput], project_context: &str) -> Result<Vec<Finding>>;
}

/// Abstraction over the chat-completions HTTP call for testability.
pub trait ChatClient {
    fn complete(&self, body: &serde_json::Value) -> Result<serde_json::Value>;
}

/// Real HTTP client with retry and exponential backoff.
struct DefaultChatClient {
    base_url: String,
    api_key: String,
}

impl ChatClient for DefaultChatClient {
    fn complete(&self, body: &serde_json::Value) -> Result<serde_json::Value> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        for attempt in 1..=MAX_RETRIES {
            match ureq::post(&url)
                .set("Authorization", &format!("Bearer {}", self.api_key))
                .set("Content-Type", "application/json")
                .send_json(body)
            {
                Ok(response) => {
                    return response.into_json().map_err(|e| {
                        Error::Analysis(format!("failed to parse backend response: {e}"))
                    });
                }
                Err(ref e) if attempt < MAX_RETRIES && is_retryable(e) => {
                    warn!(
                        attempt,
                        error = %e,
                        backoff_ms,
                        "retrying analysis backend after transient error"
                    );
                    thread::sleep(Duration::from_millis(backoff_ms));
                    backoff_ms *= 2;
                }
                Err(e) => {
                    return Err(Error::Analysis(format!("backend request failed: {e}")));
                }
            }
        }
        unreachable!()
    }
}

/// Only retry rate-limits (429), server errors (5xx), and transport errors.
fn is_retryable(err: &ureq::Error) -> bool {
    match err {
        ureq::Error::Status(code, _) => *code == 429 || *code >= 500,
        ureq::Error::Transport(_) => true,
    }
}

/// OpenRouter-style chat-completions backend.
pub struct OpenRouterBackend {
    model: String,
    prompt_engine: PromptEngine,
    client: Box<dyn ChatClient>,
}

impl OpenRouterBackend {
    /// Build the backend from config. The API key is read from the
    /// configured environment variable.
    pub fn from_config(config: &AnalysisConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            Error::Analysis(format!("API key not found in ${}", config.api_key_env))
        })?;

        Ok(Self {
            model: config.model.clone(),
            prompt_engine: PromptEngine::new(None),
            client: Box::new(DefaultChatClient {
                base_url: config.base_url.clone(),
                api_key,
            }),
        })
    }

    #[cfg(test)]
    fn with_client(model: &str, client: Box<dyn ChatClient>) -> Self {
        Self {
            model: model.to_string(),
            prompt_engine: PromptEngine::new(None),
            client,
        }
    }

    fn build_prompt(&self, files: &[ReviewInput], project_context: &str) -> Result<String> {
        let files_json = serde_json::to_string(files)
            .map_err(|e| Error::Analysis(format!("failed to serialize file bundle: {e}")))?;

        let mut vars = HashMap::new();
        vars.insert("files_json".to_string(), files_json);
        vars.insert("project_context".to_string(), project_context.to_string());
        self.prompt_engine.render("review", &vars)
    }
}

impl AnalysisBackend for OpenRouterBackend {
    fn review(&self, files: &[ReviewInput], project_context: &str) -> Result<Vec<Finding>> {
        let prompt = self.build_prompt(files, project_context)?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
        });

        let response = self.client.complete(&body)?;

        let Some(content) = response
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
        else {
            warn!("backend response has no content; treating as zero findings");
            return Ok(Vec::new());
        };

        debug!(bytes = content.len(), "analysis response received");
        Ok(parse_findings(content))
    }
}

/// Parse the backend's textual reply into findings.
///
/// The reply should be a JSON list, but models wrap it in markdown fences or
/// return junk often enough that this is written defensively: an unparsable
/// reply is logged and treated as zero findings (distinct from a clean pass,
/// which parses to an empty list), and individual malformed entries are
/// dropped without failing the rest.
pub fn parse_findings(raw: &str) -> Vec<Finding> {
    let json = strip_markdown_fences(raw);
    if json.is_empty() {
        warn!("analysis response was empty; treating as zero findings");
        return Vec::new();
    }

    let value: serde_json::Value = match serde_json::from_str(&json) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "analysis response was not valid JSON; treating as zero findings");
            return Vec::new();
        }
    };

    let Some(entries) = value.as_array() else {
        warn!("analysis response was not a JSON list; treating as zero findings");
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let finding = extract_finding(entry);
            if finding.is_none() {
                warn!(%entry, "dropping malformed finding entry");
            }
            finding
        })
        .collect()
}

fn extract_finding(entry: &serde_json::Value) -> Option<Finding> {
    let filename = entry.get("filename")?.as_str()?.trim();
    if filename.is_empty() {
        return None;
    }

    let message = entry
        .get("message")
        .or_else(|| entry.get("comment"))?
        .as_str()?
        .trim();
    if message.is_empty() {
        return None;
    }

    let line = entry
        .get("line")
        .or_else(|| entry.get("line_number"))
        .and_then(parse_line);

    let severity = entry
        .get("severity")
        .and_then(|s| s.as_str())
        .map(Severity::parse_lenient)
        .unwrap_or_default();

    Some(Finding {
        filename: filename.to_string(),
        line,
        severity,
        message: message.to_string(),
    })
}

/// Accept a line as a positive integer or a numeric string; anything else
/// becomes "no line".
fn parse_line(value: &serde_json::Value) -> Option<u32> {
    let n = match value {
        serde_json::Value::Number(n) => n.as_u64()?,
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok()?,
        _ => return None,
    };
    if n == 0 {
        return None;
    }
    u32::try_from(n).ok()
}

/// Remove markdown code fences from a string, returning the inner content.
/// Handles ` ```json `, ` ``` `, and bare JSON.
fn strip_markdown_fences(input: &str) -> String {
    let trimmed = input.trim();

    if let Some(rest) = trimmed.strip_prefix("```") {
        let after_tag = if let Some(pos) = rest.find('\n') {
            &rest[pos + 1..]
        } else {
            return String::new();
        };

        if let Some(pos) = after_tag.rfind("```") {
            return after_tag[..pos].trim().to_string();
        }
        return after_tag.trim().to_string();
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_findings() {
        let raw = r#"[
            {"filename": "src/db.py", "line": 42, "severity": "critical", "message": "SQL injection"},
            {"filename": "src/ui.py", "line": 7, "severity": "low", "message": "Dead branch"}
        ]"#;
        let findings = parse_findings(raw);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].filename, "src/db.py");
        assert_eq!(findings[0].line, Some(42));
        assert_eq!(findings[0].severity, Severity::Critical);
        assert_eq!(findings[1].severity, Severity::Low);
    }

    #[test]
    fn test_parse_accepts_original_field_names() {
        let raw = r#"[{"filename": "a.py", "line_number": 3, "comment": "bug"}]"#;
        let findings = parse_findings(raw);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line, Some(3));
        assert_eq!(findings[0].message, "bug");
    }

    #[test]
    fn test_parse_missing_severity_defaults_to_medium() {
        let raw = r#"[{"filename": "a.py", "line": 1, "message": "bug"}]"#;
        assert_eq!(parse_findings(raw)[0].severity, Severity::Medium);
    }

    #[test]
    fn test_parse_unknown_severity_defaults_to_medium() {
        let raw = r#"[{"filename": "a.py", "line": 1, "severity": "ultra", "message": "bug"}]"#;
        assert_eq!(parse_findings(raw)[0].severity, Severity::Medium);
    }

    #[test]
    fn test_parse_line_as_string() {
        let raw = r#"[{"filename": "a.py", "line": "17", "message": "bug"}]"#;
        assert_eq!(parse_findings(raw)[0].line, Some(17));
    }

    #[test]
    fn test_parse_invalid_line_becomes_none() {
        let raw = r#"[
            {"filename": "a.py", "line": "forty", "message": "bug"},
            {"filename": "b.py", "line": 0, "message": "bug"},
            {"filename": "c.py", "line": -4, "message": "bug"}
        ]"#;
        let findings = parse_findings(raw);
        assert_eq!(findings.len(), 3);
        assert!(findings.iter().all(|f| f.line.is_none()));
    }

    #[test]
    fn test_parse_missing_line_is_none() {
        let raw = r#"[{"filename": "a.py", "message": "file-level issue"}]"#;
        assert_eq!(parse_findings(raw)[0].line, None);
    }

    #[test]
    fn test_parse_drops_entry_without_message() {
        let raw = r#"[
            {"filename": "a.py", "line": 1},
            {"filename": "b.py", "line": 2, "message": "kept"}
        ]"#;
        let findings = parse_findings(raw);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].filename, "b.py");
    }

    #[test]
    fn test_parse_drops_entry_without_filename() {
        let raw = r#"[{"line": 1, "message": "orphan"}]"#;
        assert!(parse_findings(raw).is_empty());
    }

    #[test]
    fn test_parse_empty_list() {
        assert!(parse_findings("[]").is_empty());
    }

    #[test]
    fn test_parse_garbage_is_zero_findings() {
        assert!(parse_findings("the code looks great!").is_empty());
    }

    #[test]
    fn test_parse_non_list_json_is_zero_findings() {
        assert!(parse_findings(r#"{"verdict": "fine"}"#).is_empty());
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "```json\n[{\"filename\": \"a.py\", \"line\": 1, \"message\": \"bug\"}]\n```";
        assert_eq!(parse_findings(raw).len(), 1);
    }

    #[test]
    fn test_strip_markdown_json_fence() {
        let input = "```json\n[1]\n```";
        assert_eq!(strip_markdown_fences(input), "[1]");
    }

    #[test]
    fn test_strip_markdown_bare_fence() {
        let input = "```\n[1]\n```";
        assert_eq!(strip_markdown_fences(input), "[1]");
    }

    #[test]
    fn test_strip_no_fence_passthrough() {
        assert_eq!(strip_markdown_fences("  [1] "), "[1]");
    }

    #[test]
    fn test_strip_unterminated_fence() {
        let input = "```json\n[1]";
        assert_eq!(strip_markdown_fences(input), "[1]");
    }

    // --- Backend tests via mock client ---

    use std::cell::RefCell;
    use std::rc::Rc;

    struct MockChatClient {
        reply: String,
        requests: Rc<RefCell<Vec<serde_json::Value>>>,
    }

    impl MockChatClient {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                requests: Rc::new(RefCell::new(Vec::new())),
            }
        }
    }

    impl ChatClient for MockChatClient {
        fn complete(&self, body: &serde_json::Value) -> Result<serde_json::Value> {
            self.requests.borrow_mut().push(body.clone());
            Ok(serde_json::json!({
                "choices": [{ "message": { "content": self.reply } }]
            }))
        }
    }

    fn input(filename: &str, patch: &str) -> ReviewInput {
        ReviewInput {
            filename: filename.to_string(),
            patch: patch.to_string(),
            content: None,
        }
    }

    #[test]
    fn test_review_parses_reply() {
        let client = MockChatClient::new(
            r#"[{"filename": "a.py", "line": 5, "severity": "high", "message": "bug"}]"#,
        );
        let backend = OpenRouterBackend::with_client("test/model", Box::new(client));
        let findings = backend
            .review(&[input("a.py", "@@ -1 +1 @@")], "context")
            .unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::High);
    }

    #[test]
    fn test_review_sends_model_and_files() {
        let client = Box::new(MockChatClient::new("[]"));
        let requests = client.requests.clone();
        let backend = OpenRouterBackend::with_client("test/model", client);
        backend
            .review(&[input("src/app.py", "@@ -1 +2 @@")], "my project")
            .unwrap();

        let sent = requests.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["model"], "test/model");
        let user_msg = sent[0]["messages"][1]["content"].as_str().unwrap();
        assert!(user_msg.contains("src/app.py"));
        assert!(user_msg.contains("my project"));
    }

    #[test]
    fn test_review_tolerates_contentless_reply() {
        struct EmptyClient;
        impl ChatClient for EmptyClient {
            fn complete(&self, _body: &serde_json::Value) -> Result<serde_json::Value> {
                Ok(serde_json::json!({ "choices": [] }))
            }
        }
        let backend = OpenRouterBackend::with_client("m", Box::new(EmptyClient));
        assert!(backend.review(&[input("a.py", "")], "").unwrap().is_empty());
    }

    #[test]
    fn test_review_propagates_transport_error() {
        struct FailingClient;
        impl ChatClient for FailingClient {
            fn complete(&self, _body: &serde_json::Value) -> Result<serde_json::Value> {
                Err(Error::Analysis("connection refused".to_string()))
            }
        }
        let backend = OpenRouterBackend::with_client("m", Box::new(FailingClient));
        let err = backend.review(&[input("a.py", "")], "").unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_file_bundle_serialization() {
        let files = vec![ReviewInput {
            filename: "a.py".to_string(),
            patch: "@@ -1 +1 @@".to_string(),
            content: None,
        }];
        let json = serde_json::to_string(&files).unwrap();
        // Absent content stays out of the bundle entirely.
        assert!(!json.contains("content"));
    }
}
