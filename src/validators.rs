use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::ValidatorConfig;
use crate::process::{ProcessConfig, run_captured};
use crate::routing::ValidatorTarget;

/// What happened when a validator ran (or didn't).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatorOutcome {
    Passed { output: String },
    Failed { output: String },
    /// No script found for the target in any search dir.
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorRun {
    pub target: ValidatorTarget,
    pub outcome: ValidatorOutcome,
}

/// Executes validator scripts resolved by the routing table, each under a
/// bounded time budget.
pub struct ValidatorRunner {
    search_dirs: Vec<PathBuf>,
    interpreter: String,
    time_budget: Duration,
}

impl ValidatorRunner {
    pub fn new(search_dirs: Vec<PathBuf>, interpreter: String, time_budget: Duration) -> Self {
        Self {
            search_dirs,
            interpreter,
            time_budget,
        }
    }

    pub fn from_config(config: &ValidatorConfig) -> Self {
        Self::new(
            config.search_dirs.iter().map(PathBuf::from).collect(),
            config.interpreter.clone(),
            Duration::from_secs(config.time_budget_secs),
        )
    }

    /// Locate the script for a target: `<dir>/<category>/scripts/<validator_id>`,
    /// first search dir wins.
    fn find_script(&self, target: &ValidatorTarget) -> Option<PathBuf> {
        self.search_dirs
            .iter()
            .map(|dir| {
                dir.join(&target.category)
                    .join("scripts")
                    .join(&target.validator_id)
            })
            .find(|candidate| candidate.exists())
    }

    /// Run one validator against a file. A missing script is skipped, a
    /// nonzero exit or a blown time budget is a failure.
    pub async fn run(&self, target: &ValidatorTarget, file: &str) -> ValidatorRun {
        let Some(script) = self.find_script(target) else {
            warn!(
                validator = %target.validator_id,
                category = %target.category,
                "validator script not found"
            );
            return ValidatorRun {
                target: target.clone(),
                outcome: ValidatorOutcome::Missing,
            };
        };

        debug!(script = %script.display(), file, "running validator");

        let config = ProcessConfig {
            command: self.interpreter.clone(),
            args: vec![script.to_string_lossy().to_string(), file.to_string()],
            working_dir: PathBuf::from("."),
            timeout: Some(self.time_budget),
            env: vec![],
        };

        let outcome = match run_captured(config).await {
            Ok(output) => {
                let mut text = output.stdout_lines.join("\n");
                if !output.stderr_lines.is_empty() {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(&output.stderr_lines.join("\n"));
                }
                if output.success() {
                    ValidatorOutcome::Passed { output: text }
                } else {
                    ValidatorOutcome::Failed { output: text }
                }
            }
            Err(e) => ValidatorOutcome::Failed {
                output: e.to_string(),
            },
        };

        ValidatorRun {
            target: target.clone(),
            outcome,
        }
    }

    /// Run every target in order. Each validator gets its own time budget.
    pub async fn run_all(&self, targets: &[ValidatorTarget], file: &str) -> Vec<ValidatorRun> {
        let mut runs = Vec::with_capacity(targets.len());
        for target in targets {
            runs.push(self.run(target, file).await);
        }
        runs
    }
}

/// Whether every validator that actually ran passed. Missing scripts are
/// skipped, not failed.
pub fn all_passed(runs: &[ValidatorRun]) -> bool {
    runs.iter()
        .all(|run| !matches!(run.outcome, ValidatorOutcome::Failed { .. }))
}
