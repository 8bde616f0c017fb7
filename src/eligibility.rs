use serde::Deserialize;

/// Paths excluded from review, by extension or by directory name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IgnoreRules {
    /// Exact, case-sensitive suffix matches (e.g. `.lock`).
    pub extensions: Vec<String>,
    /// Path segments that disqualify the whole path (e.g. `node_modules`).
    pub directories: Vec<String>,
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self {
            extensions: [
                ".json", ".md", ".txt", ".yml", ".yaml", ".lock", ".png", ".jpg", ".jpeg",
                ".gif", ".svg",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            directories: ["dist", "build", "node_modules", ".github"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Whether a file path is in scope for review. Pure and total: any string
/// input yields an answer, the empty path is never eligible.
pub fn is_eligible(path: &str, rules: &IgnoreRules) -> bool {
    if path.is_empty() {
        return false;
    }
    if rules.extensions.iter().any(|ext| path.ends_with(ext.as_str())) {
        return false;
    }
    if path
        .split('/')
        .any(|segment| rules.directories.iter().any(|dir| dir == segment))
    {
        return false;
    }
    true
}
