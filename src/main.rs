use std::path::Path;

use clap::Parser;
use tracing::info;

use revu::analysis::OpenRouterBackend;
use revu::cli::{Cli, CliCommand};
use revu::config::Config;
use revu::eligibility;
use revu::error::{Error, Result};
use revu::event::{self, ReviewTarget};
use revu::hosts::github::GitHubHost;
use revu::orchestrator::Orchestrator;
use revu::routing::RoutingTable;
use revu::validators::{self, ValidatorOutcome, ValidatorRunner};

fn init_logging() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging();

    let config = match Config::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    let result = match cli.command.clone() {
        Some(CliCommand::Validate { file, quiet }) => run_validate(&config, &file, quiet).await,
        None => run_review(&cli, config),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// Figure out which change set to review: an explicit `--pr` against the
/// current repo, otherwise the workflow event payload.
fn resolve_target(cli: &Cli) -> Result<ReviewTarget> {
    if let Some(pr_number) = cli.pr {
        return GitHubHost::current_repo_target(pr_number);
    }

    let path = std::env::var("GITHUB_EVENT_PATH").map_err(|_| {
        Error::Event("no --pr given and GITHUB_EVENT_PATH is not set".to_string())
    })?;
    event::load_review_target(Path::new(&path))
}

fn run_review(cli: &Cli, config: Config) -> Result<()> {
    let target = resolve_target(cli)?;
    info!(pr = target.pr_number, repo = %target.nwo(), "reviewing change set");

    let backend = OpenRouterBackend::from_config(&config.analysis)?;
    let pr_number = target.pr_number;
    let host = GitHubHost::new(target);

    let orchestrator = Orchestrator::new(host, backend, config);
    let summary = orchestrator.run_pass(pr_number)?;

    info!(
        action = summary.action.as_str(),
        reported = summary.reported,
        kept = summary.kept,
        resolved = summary.resolved,
        "review pass complete"
    );
    Ok(())
}

async fn run_validate(config: &Config, file: &str, quiet: bool) -> Result<()> {
    if !eligibility::is_eligible(file, &config.eligibility) {
        if !quiet {
            println!("Skipping validation for {file}");
        }
        return Ok(());
    }

    let table = RoutingTable::new(config.routing_rules.clone());
    let targets = table.resolve(file);
    if targets.is_empty() {
        if !quiet {
            println!("No validators configured for {file}");
        }
        return Ok(());
    }

    if !quiet {
        println!("Running {} validator(s) for {file}", targets.len());
    }

    let runner = ValidatorRunner::from_config(&config.validators);
    let runs = runner.run_all(&targets, file).await;

    for run in &runs {
        let name = format!("{} ({})", run.target.validator_id, run.target.category);
        match &run.outcome {
            ValidatorOutcome::Passed { output } => {
                if !quiet {
                    println!("PASS {name}");
                    if !output.is_empty() {
                        println!("{output}");
                    }
                }
            }
            ValidatorOutcome::Failed { output } => {
                println!("FAIL {name}");
                if !output.is_empty() {
                    println!("{output}");
                }
            }
            ValidatorOutcome::Missing => {
                if !quiet {
                    println!("SKIP {name}: script not found");
                }
            }
        }
    }

    if validators::all_passed(&runs) {
        if !quiet {
            println!("All validations passed");
        }
    } else {
        println!("Some validations found issues");
    }
    Ok(())
}
