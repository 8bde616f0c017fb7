use clap::{Parser, Subcommand};

/// revu — automated AI change-set reviewer
#[derive(Parser, Debug, Clone)]
#[command(name = "revu", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<CliCommand>,

    /// Pull request number to review (defaults to the GITHUB_EVENT_PATH payload)
    #[arg(long)]
    pub pr: Option<u64>,

    /// Go through the full pass without resolving threads or posting reviews
    #[arg(long)]
    pub dry_run: bool,

    /// Login the automation posts under, used to recognize its own threads
    #[arg(long)]
    pub bot_login: Option<String>,

    /// Model for the analysis backend to use
    #[arg(long)]
    pub model: Option<String>,

    /// Path to config file
    #[arg(long, global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CliCommand {
    /// Resolve routing rules for a file and run the matching validators
    Validate {
        /// File path to validate
        #[arg(long)]
        file: String,

        /// Only print validator issues, not progress
        #[arg(long)]
        quiet: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_review() {
        let cli = Cli::parse_from(["revu", "--pr", "42"]);
        assert_eq!(cli.pr, Some(42));
        assert!(!cli.dry_run);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_parse_dry_run() {
        let cli = Cli::parse_from(["revu", "--pr", "7", "--dry-run"]);
        assert!(cli.dry_run);
    }

    #[test]
    fn test_parse_overrides() {
        let cli = Cli::parse_from([
            "revu",
            "--pr",
            "1",
            "--bot-login",
            "my-bot",
            "--model",
            "some/model",
            "--config",
            "custom.toml",
        ]);
        assert_eq!(cli.bot_login.as_deref(), Some("my-bot"));
        assert_eq!(cli.model.as_deref(), Some("some/model"));
        assert_eq!(cli.config.as_deref(), Some("custom.toml"));
    }

    #[test]
    fn test_parse_validate_subcommand() {
        let cli = Cli::parse_from(["revu", "validate", "--file", "src/app.py"]);
        match cli.command {
            Some(CliCommand::Validate { file, quiet }) => {
                assert_eq!(file, "src/app.py");
                assert!(!quiet);
            }
            _ => panic!("expected Validate subcommand"),
        }
    }

    #[test]
    fn test_parse_validate_allows_global_config() {
        let cli = Cli::parse_from([
            "revu", "validate", "--file", "a.ts", "--quiet", "--config", "revu.toml",
        ]);
        assert_eq!(cli.config.as_deref(), Some("revu.toml"));
        assert!(matches!(
            cli.command,
            Some(CliCommand::Validate { quiet: true, .. })
        ));
    }

    #[test]
    fn test_no_pr_is_allowed() {
        // The event payload can supply the PR number instead.
        let cli = Cli::parse_from(["revu"]);
        assert!(cli.pr.is_none());
    }
}
