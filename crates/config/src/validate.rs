//! Configuration validation.
//!
//! Reports unknown or misspelled keys in a config file and values that would
//! keep the bot from working.

use std::path::{Path, PathBuf};

use crate::{
    env_subst::substitute_env,
    loader::{TOKEN_ENV, apply_env_overrides, load_config},
    schema::FerryConfig,
};

/// Progress edits closer together than this tend to hit Telegram's rate
/// limit for a single chat.
const MIN_SAFE_STATUS_INTERVAL_MS: u64 = 1000;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "missing", "value"
    pub category: &'static str,
    /// Dotted path, e.g. "relay.max_file_size"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn error(category: &'static str, path: &str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            category,
            path: path.to_string(),
            message: message.into(),
        }
    }

    fn warning(category: &'static str, path: &str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            category,
            path: path.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}] ", self.severity, self.category)?;
        if !self.path.is_empty() {
            write!(f, "{}: ", self.path)?;
        }
        f.write_str(&self.message)
    }
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

/// Check the values of a loaded configuration.
pub fn validate(config: &FerryConfig) -> ValidationResult {
    let mut diagnostics = Vec::new();

    if config.token().trim().is_empty() {
        diagnostics.push(Diagnostic::error(
            "missing",
            "telegram.token",
            format!("no bot token; set it in the config file or via {TOKEN_ENV}"),
        ));
    } else if config.token().contains("${") {
        diagnostics.push(Diagnostic::error(
            "missing",
            "telegram.token",
            "token references an environment variable that is not set",
        ));
    }

    if let Err(e) = config.telegram.api_url() {
        diagnostics.push(Diagnostic::error("value", "telegram.api_url", e.to_string()));
    }

    if config.relay.max_file_size == 0 {
        diagnostics.push(Diagnostic::error(
            "value",
            "relay.max_file_size",
            "must be greater than zero",
        ));
    }

    match config.relay.status_interval_ms {
        0 => diagnostics.push(Diagnostic::error(
            "value",
            "relay.status_interval_ms",
            "must be greater than zero",
        )),
        ms if ms < MIN_SAFE_STATUS_INTERVAL_MS => diagnostics.push(Diagnostic::warning(
            "value",
            "relay.status_interval_ms",
            format!(
                "{ms} ms between progress edits is likely to be rate limited; use at least \
                 {MIN_SAFE_STATUS_INTERVAL_MS}"
            ),
        )),
        _ => {},
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

/// Validate a config file: syntax, unknown keys, then the values it yields
/// once environment overrides are applied.
pub fn validate_file(path: &Path) -> ValidationResult {
    let mut result = ValidationResult {
        diagnostics: Vec::new(),
        config_path: Some(path.to_path_buf()),
    };

    match raw_value(path) {
        Ok(value) => check_unknown_fields(&value, &mut result.diagnostics),
        Err(message) => {
            result
                .diagnostics
                .push(Diagnostic::error("syntax", "", message));
            return result;
        },
    }

    match load_config(path).and_then(apply_env_overrides) {
        Ok(config) => result.diagnostics.extend(validate(&config).diagnostics),
        Err(e) => result
            .diagnostics
            .push(Diagnostic::error("value", "", e.to_string())),
    }
    result
}

fn raw_value(path: &Path) -> Result<serde_json::Value, String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");
    match ext {
        "toml" => toml::from_str::<toml::Value>(&raw)
            .map_err(|e| e.to_string())
            .and_then(|v| serde_json::to_value(v).map_err(|e| e.to_string())),
        "yaml" | "yml" => serde_yaml::from_str::<serde_yaml::Value>(&raw)
            .map_err(|e| e.to_string())
            .and_then(|v| serde_json::to_value(v).map_err(|e| e.to_string())),
        "json" => serde_json::from_str(&raw).map_err(|e| e.to_string()),
        _ => Err(format!("unsupported config format: .{ext}")),
    }
}

const SECTIONS: &[(&str, &[&str])] = &[
    ("telegram", &["token", "api_url", "allowlist"]),
    ("relay", &["max_file_size", "status_interval_ms", "staging_dir"]),
];

fn check_unknown_fields(value: &serde_json::Value, diagnostics: &mut Vec<Diagnostic>) {
    let Some(root) = value.as_object() else {
        if !value.is_null() {
            diagnostics.push(Diagnostic::error(
                "syntax",
                "",
                "top level must be a table",
            ));
        }
        return;
    };
    let section_names: Vec<&str> = SECTIONS.iter().map(|(name, _)| *name).collect();

    for (key, section) in root {
        let Some((_, fields)) = SECTIONS.iter().find(|(name, _)| name == key) else {
            diagnostics.push(unknown_field(key, key, &section_names));
            continue;
        };
        let Some(section) = section.as_object() else {
            continue;
        };
        for field in section.keys() {
            if !fields.contains(&field.as_str()) {
                diagnostics.push(unknown_field(&format!("{key}.{field}"), field, fields));
            }
        }
    }
}

fn unknown_field(path: &str, key: &str, candidates: &[&str]) -> Diagnostic {
    let message = match suggest(key, candidates, 3) {
        Some(s) => format!("unknown field \"{key}\" (did you mean \"{s}\"?)"),
        None => format!("unknown field \"{key}\""),
    };
    Diagnostic::warning("unknown-field", path, message)
}

/// Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut curr = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        prev = curr;
    }
    prev[b.len()]
}

fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|c| (*c, levenshtein(needle, c)))
        .filter(|(_, d)| *d <= max_distance)
        .min_by_key(|(_, d)| *d)
        .map(|(c, _)| c)
}
