use std::path::Path;

use serde::Deserialize;

/// How a routing rule's pattern is matched against a file path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// Pattern is an extension like `.ts`, matched against the path's extension.
    Extension,
    /// Pattern is a substring of the last path segment.
    FilenameSubstring,
    /// Pattern is a substring of the full path.
    PathSubstring,
}

/// A validator a rule routes to, with the category (skill) it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidatorTarget {
    pub validator_id: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingRule {
    pub pattern: String,
    pub kind: PatternKind,
    pub targets: Vec<ValidatorTarget>,
}

fn match_extension(path: &str, pattern: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| pattern.strip_prefix('.') == Some(ext))
}

fn match_filename(path: &str, pattern: &str) -> bool {
    path.rsplit('/')
        .next()
        .is_some_and(|name| name.contains(pattern))
}

fn match_path(path: &str, pattern: &str) -> bool {
    path.contains(pattern)
}

/// The three pattern kinds behind one matcher signature, evaluated in this
/// order for every lookup.
const MATCHERS: &[(PatternKind, fn(&str, &str) -> bool)] = &[
    (PatternKind::Extension, match_extension),
    (PatternKind::FilenameSubstring, match_filename),
    (PatternKind::PathSubstring, match_path),
];

/// Pattern-based table mapping file paths to validator targets.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    rules: Vec<RoutingRule>,
}

impl RoutingTable {
    pub fn new(rules: Vec<RoutingRule>) -> Self {
        Self { rules }
    }

    /// Resolve the validators that apply to a path.
    ///
    /// All three matcher passes run unconditionally, so a path can collect
    /// targets from several rule kinds at once. Each `(validator_id, category)`
    /// pair is emitted at most once, in first-occurrence order. No match is a
    /// valid empty result, not an error. Each lookup is a single scan of the
    /// rule list per matcher pass.
    pub fn resolve(&self, path: &str) -> Vec<ValidatorTarget> {
        let mut seen: Vec<&ValidatorTarget> = Vec::new();
        let mut resolved = Vec::new();

        for (kind, matches) in MATCHERS {
            for rule in self.rules.iter().filter(|r| r.kind == *kind) {
                if !matches(path, &rule.pattern) {
                    continue;
                }
                for target in &rule.targets {
                    if seen.contains(&target) {
                        continue;
                    }
                    seen.push(target);
                    resolved.push(target.clone());
                }
            }
        }

        resolved
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

fn rule(pattern: &str, kind: PatternKind, validator_id: &str, category: &str) -> RoutingRule {
    RoutingRule {
        pattern: pattern.to_string(),
        kind,
        targets: vec![ValidatorTarget {
            validator_id: validator_id.to_string(),
            category: category.to_string(),
        }],
    }
}

/// Built-in rules used when the config file does not define any.
pub fn default_rules() -> Vec<RoutingRule> {
    use PatternKind::*;
    vec![
        rule(".tsx", Extension, "react_performance_checker.py", "nextjs-react-expert"),
        rule(".jsx", Extension, "react_performance_checker.py", "nextjs-react-expert"),
        rule(".ts", Extension, "type_coverage.py", "lint-and-validate"),
        rule(".py", Extension, "lint_runner.py", "lint-and-validate"),
        rule(".html", Extension, "accessibility_checker.py", "frontend-design"),
        rule(".css", Extension, "ux_audit.py", "frontend-design"),
        rule("schema.prisma", FilenameSubstring, "schema_validator.py", "database-design"),
        rule(".env", FilenameSubstring, "security_scan.py", "vulnerability-scanner"),
        rule("App.tsx", FilenameSubstring, "mobile_audit.py", "mobile-design"),
        rule("api/", PathSubstring, "api_validator.py", "api-patterns"),
        rule("routes/", PathSubstring, "api_validator.py", "api-patterns"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(validator_id: &str, category: &str) -> ValidatorTarget {
        ValidatorTarget {
            validator_id: validator_id.to_string(),
            category: category.to_string(),
        }
    }

    #[test]
    fn test_extension_rule_matches() {
        let table = RoutingTable::new(vec![rule(
            ".py",
            PatternKind::Extension,
            "lint_runner.py",
            "lint-and-validate",
        )]);
        let resolved = table.resolve("scripts/deploy.py");
        assert_eq!(resolved, vec![target("lint_runner.py", "lint-and-validate")]);
    }

    #[test]
    fn test_extension_rule_requires_exact_extension() {
        let table = RoutingTable::new(vec![rule(
            ".ts",
            PatternKind::Extension,
            "type_coverage.py",
            "lint-and-validate",
        )]);
        // .tsx is a different extension, not a suffix match.
        assert!(table.resolve("src/App.tsx").is_empty());
    }

    #[test]
    fn test_filename_substring_matches_last_segment_only() {
        let table = RoutingTable::new(vec![rule(
            ".env",
            PatternKind::FilenameSubstring,
            "security_scan.py",
            "vulnerability-scanner",
        )]);
        assert_eq!(table.resolve("config/.env.production").len(), 1);
        // ".env" appears in a directory segment, not the filename.
        assert!(table.resolve("deploy/.env-templates/notes.rst").is_empty());
    }

    #[test]
    fn test_path_substring_matches_full_path() {
        let table = RoutingTable::new(vec![rule(
            "api/",
            PatternKind::PathSubstring,
            "api_validator.py",
            "api-patterns",
        )]);
        assert_eq!(table.resolve("src/api/users.ts").len(), 1);
        assert!(table.resolve("src/client/users.ts").is_empty());
    }

    #[test]
    fn test_multiple_kinds_fire_for_one_path() {
        let table = RoutingTable::new(vec![
            rule(".ts", PatternKind::Extension, "type_coverage.py", "lint-and-validate"),
            rule("api/", PatternKind::PathSubstring, "api_validator.py", "api-patterns"),
        ]);
        let resolved = table.resolve("src/api/users.ts");
        assert_eq!(
            resolved,
            vec![
                target("type_coverage.py", "lint-and-validate"),
                target("api_validator.py", "api-patterns"),
            ]
        );
    }

    #[test]
    fn test_duplicate_pairs_deduplicated_across_rules() {
        // A third rule routing to the same pair must not produce a duplicate.
        let table = RoutingTable::new(vec![
            rule(".ts", PatternKind::Extension, "type_coverage.py", "lint-and-validate"),
            rule("api/", PatternKind::PathSubstring, "api_validator.py", "api-patterns"),
            rule("users", PatternKind::FilenameSubstring, "api_validator.py", "api-patterns"),
        ]);
        let resolved = table.resolve("src/api/users.ts");
        assert_eq!(
            resolved,
            vec![
                target("type_coverage.py", "lint-and-validate"),
                target("api_validator.py", "api-patterns"),
            ]
        );
    }

    #[test]
    fn test_same_validator_different_category_not_deduplicated() {
        let table = RoutingTable::new(vec![
            rule(".ts", PatternKind::Extension, "api_validator.py", "lint-and-validate"),
            rule("api/", PatternKind::PathSubstring, "api_validator.py", "api-patterns"),
        ]);
        assert_eq!(table.resolve("src/api/users.ts").len(), 2);
    }

    #[test]
    fn test_no_match_returns_empty() {
        let table = RoutingTable::default();
        assert!(table.resolve("Makefile").is_empty());
    }

    #[test]
    fn test_rule_with_multiple_targets() {
        let table = RoutingTable::new(vec![RoutingRule {
            pattern: ".py".to_string(),
            kind: PatternKind::Extension,
            targets: vec![
                target("lint_runner.py", "lint-and-validate"),
                target("security_scan.py", "vulnerability-scanner"),
            ],
        }]);
        assert_eq!(table.resolve("main.py").len(), 2);
    }

    #[test]
    fn test_default_rules_cover_react_and_mobile() {
        let table = RoutingTable::default();
        let resolved = table.resolve("mobile/App.tsx");
        assert_eq!(
            resolved,
            vec![
                target("react_performance_checker.py", "nextjs-react-expert"),
                target("mobile_audit.py", "mobile-design"),
            ]
        );
    }

    #[test]
    fn test_first_occurrence_order_preserved() {
        let table = RoutingTable::new(vec![
            rule("routes/", PatternKind::PathSubstring, "api_validator.py", "api-patterns"),
            rule(".py", PatternKind::Extension, "lint_runner.py", "lint-and-validate"),
        ]);
        // Extension pass runs before path-substring pass.
        let resolved = table.resolve("routes/health.py");
        assert_eq!(resolved[0], target("lint_runner.py", "lint-and-validate"));
        assert_eq!(resolved[1], target("api_validator.py", "api-patterns"));
    }
}
