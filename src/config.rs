use std::path::Path;

use serde::Deserialize;

use crate::cli::Cli;
use crate::eligibility::IgnoreRules;
use crate::error::{Error, Result};
use crate::findings::SeverityLabels;
use crate::routing::{self, PatternKind, RoutingRule};

const DEFAULT_CONFIG_PATH: &str = "revu.toml";

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub bot_login: Option<String>,
    pub dry_run: Option<bool>,
    #[serde(default)]
    pub analysis: AnalysisSection,
    #[serde(default)]
    pub eligibility: Option<IgnoreRules>,
    #[serde(default)]
    pub labels: Option<SeverityLabels>,
    #[serde(default)]
    pub validators: ValidatorSection,
    #[serde(default)]
    pub routing: RoutingSection,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AnalysisSection {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key_env: Option<String>,
    pub project_context: Option<String>,
    pub include_file_contents: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ValidatorSection {
    pub search_dirs: Option<Vec<String>>,
    pub interpreter: Option<String>,
    pub time_budget_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RoutingSection {
    #[serde(default)]
    pub rules: Vec<RoutingRule>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub project_context: String,
    pub include_file_contents: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorConfig {
    pub search_dirs: Vec<String>,
    pub interpreter: String,
    pub time_budget_secs: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bot_login: String,
    pub dry_run: bool,
    pub analysis: AnalysisConfig,
    pub eligibility: IgnoreRules,
    pub labels: SeverityLabels,
    pub validators: ValidatorConfig,
    pub routing_rules: Vec<RoutingRule>,
}

impl Config {
    /// Load the config file and merge CLI overrides on top.
    ///
    /// An explicitly requested file must exist; the default path is optional
    /// and falls back to built-in defaults when absent.
    pub fn load(cli: &Cli) -> Result<Self> {
        let (path, explicit) = match cli.config.as_deref() {
            Some(p) => (Path::new(p), true),
            None => (Path::new(DEFAULT_CONFIG_PATH), false),
        };

        let file_config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            parse_config(&content)?
        } else if explicit {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        } else {
            ConfigFile::default()
        };

        Ok(merge(file_config, cli))
    }
}

pub fn parse_config(content: &str) -> Result<ConfigFile> {
    let config: ConfigFile = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &ConfigFile) -> Result<()> {
    if let Some(budget) = config.validators.time_budget_secs
        && budget == 0
    {
        return Err(Error::ConfigValidation(
            "validators.time_budget_secs must be > 0".to_string(),
        ));
    }
    if let Some(ref model) = config.analysis.model
        && model.trim().is_empty()
    {
        return Err(Error::ConfigValidation(
            "analysis.model must not be empty".to_string(),
        ));
    }
    for rule in &config.routing.rules {
        if rule.kind == PatternKind::Extension && !rule.pattern.starts_with('.') {
            return Err(Error::ConfigValidation(format!(
                "extension pattern must start with '.': {}",
                rule.pattern
            )));
        }
        if rule.targets.is_empty() {
            return Err(Error::ConfigValidation(format!(
                "routing rule has no targets: {}",
                rule.pattern
            )));
        }
    }
    Ok(())
}

pub fn merge(file: ConfigFile, cli: &Cli) -> Config {
    Config {
        bot_login: cli
            .bot_login
            .clone()
            .or(file.bot_login)
            .unwrap_or_else(|| "github-actions[bot]".to_string()),
        dry_run: cli.dry_run || file.dry_run.unwrap_or(false),
        analysis: AnalysisConfig {
            base_url: file
                .analysis
                .base_url
                .unwrap_or_else(|| "https://openrouter.ai/api/v1".to_string()),
            model: cli
                .model
                .clone()
                .or(file.analysis.model)
                .unwrap_or_else(|| "mistralai/devstral-2512:free".to_string()),
            api_key_env: file
                .analysis
                .api_key_env
                .unwrap_or_else(|| "OPENROUTER_API_KEY".to_string()),
            project_context: file.analysis.project_context.unwrap_or_default(),
            include_file_contents: file.analysis.include_file_contents.unwrap_or(false),
        },
        eligibility: file.eligibility.unwrap_or_default(),
        labels: file.labels.unwrap_or_default(),
        validators: ValidatorConfig {
            search_dirs: file.validators.search_dirs.unwrap_or_else(|| {
                vec![".claude/skills".to_string(), ".agent/skills".to_string()]
            }),
            interpreter: file
                .validators
                .interpreter
                .unwrap_or_else(|| "python3".to_string()),
            time_budget_secs: file.validators.time_budget_secs.unwrap_or(30),
        },
        routing_rules: if file.routing.rules.is_empty() {
            routing::default_rules()
        } else {
            file.routing.rules
        },
    }
}
