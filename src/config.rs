use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GuardError, Result};

/// Embedded default configuration.
const DEFAULT_CONFIG: &str = include_str!("../config.default.toml");

/// Project-relative location of the local override file.
pub const LOCAL_OVERRIDE_PATH: &str = ".claude/cc-guardrail.toml";

// ── Config types ──
//
// Defaults and overrides share these types. Every field is optional: an
// unset field means "not configured here", and a guard reading an unset
// field falls back to its own built-in constant.

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub command: CommandConfig,
    #[serde(default)]
    pub edit: EditConfig,
    #[serde(default)]
    pub allowlist: AllowlistConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub post_edit: PostEditConfig,
    #[serde(default)]
    pub session: SessionConfig,
    /// Named on/off switches. Merged key by key.
    #[serde(default)]
    pub enforcement: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CommandConfig {
    /// Hard blocks, evaluated in order before any ask rule.
    pub block: Option<Vec<RuleConfig>>,
    /// Soft blocks, evaluated in order after every block rule.
    pub ask: Option<Vec<RuleConfig>>,
    /// A command containing this token skips the ask rules.
    pub ask_override_token: Option<String>,
}

/// One `[[command.block]]` / `[[command.ask]]` table.
///
/// Exactly one of `pattern` and `predicate` must be set.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RuleConfig {
    pub pattern: Option<String>,
    pub predicate: Option<String>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EditConfig {
    pub protected_paths: Option<Vec<String>>,
    pub max_lines_code: Option<usize>,
    pub max_lines_test: Option<usize>,
    pub warn_fraction: Option<f64>,
    pub plan_gated_paths: Option<Vec<String>>,
    pub progress_state_file: Option<String>,
    pub sync_zones: Option<Vec<String>>,
    pub sync_upstream_dir: Option<String>,
    pub exclude_from_sync: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AllowlistConfig {
    pub always_allowed: Option<Vec<String>>,
    pub task_id_pattern: Option<String>,
    pub spec_dir: Option<String>,
    pub git_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PromptConfig {
    pub complexity_patterns: Option<Vec<String>>,
    pub skill_indicators: Option<Vec<String>>,
    pub guidance: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PostEditConfig {
    pub write_tools: Option<Vec<String>>,
    pub extensions: Option<Vec<String>>,
    pub format_command: Option<Vec<String>>,
    pub lint_command: Option<Vec<String>>,
    pub timeout_ms: Option<u64>,
    pub max_lint_warnings: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SessionConfig {
    pub diary_index: Option<String>,
    pub pending_marker: Option<String>,
    pub pending_threshold: Option<usize>,
}

// ── Merge logic ──

/// Overlay a single field: a configured value replaces the base outright.
fn merge_field<T: Clone>(base: &mut Option<T>, overlay: &Option<T>) {
    if let Some(v) = overlay {
        *base = Some(v.clone());
    }
}

impl CommandConfig {
    fn merge_from(&mut self, o: &Self) {
        merge_field(&mut self.block, &o.block);
        merge_field(&mut self.ask, &o.ask);
        merge_field(&mut self.ask_override_token, &o.ask_override_token);
    }
}

impl EditConfig {
    fn merge_from(&mut self, o: &Self) {
        merge_field(&mut self.protected_paths, &o.protected_paths);
        merge_field(&mut self.max_lines_code, &o.max_lines_code);
        merge_field(&mut self.max_lines_test, &o.max_lines_test);
        merge_field(&mut self.warn_fraction, &o.warn_fraction);
        merge_field(&mut self.plan_gated_paths, &o.plan_gated_paths);
        merge_field(&mut self.progress_state_file, &o.progress_state_file);
        merge_field(&mut self.sync_zones, &o.sync_zones);
        merge_field(&mut self.sync_upstream_dir, &o.sync_upstream_dir);
        merge_field(&mut self.exclude_from_sync, &o.exclude_from_sync);
    }
}

impl AllowlistConfig {
    fn merge_from(&mut self, o: &Self) {
        merge_field(&mut self.always_allowed, &o.always_allowed);
        merge_field(&mut self.task_id_pattern, &o.task_id_pattern);
        merge_field(&mut self.spec_dir, &o.spec_dir);
        merge_field(&mut self.git_timeout_ms, &o.git_timeout_ms);
    }
}

impl PromptConfig {
    fn merge_from(&mut self, o: &Self) {
        merge_field(&mut self.complexity_patterns, &o.complexity_patterns);
        merge_field(&mut self.skill_indicators, &o.skill_indicators);
        merge_field(&mut self.guidance, &o.guidance);
    }
}

impl PostEditConfig {
    fn merge_from(&mut self, o: &Self) {
        merge_field(&mut self.write_tools, &o.write_tools);
        merge_field(&mut self.extensions, &o.extensions);
        merge_field(&mut self.format_command, &o.format_command);
        merge_field(&mut self.lint_command, &o.lint_command);
        merge_field(&mut self.timeout_ms, &o.timeout_ms);
        merge_field(&mut self.max_lint_warnings, &o.max_lint_warnings);
    }
}

impl SessionConfig {
    fn merge_from(&mut self, o: &Self) {
        merge_field(&mut self.diary_index, &o.diary_index);
        merge_field(&mut self.pending_marker, &o.pending_marker);
        merge_field(&mut self.pending_threshold, &o.pending_threshold);
    }
}

impl Config {
    /// Parse the embedded default configuration.
    pub fn default_config() -> Result<Self> {
        Self::from_toml(DEFAULT_CONFIG, "embedded defaults")
    }

    /// Parse a TOML document; `origin` names it in error messages.
    pub fn from_toml(content: &str, origin: &str) -> Result<Self> {
        toml::from_str(content).map_err(|source| GuardError::ConfigParse {
            origin: origin.to_string(),
            source,
        })
    }

    /// Read the project-local override, if one exists.
    ///
    /// `Ok(None)` when the file is absent; `Err` when it exists but cannot
    /// be read or parsed.
    pub fn load_overlay(project_dir: &Path) -> Result<Option<Self>> {
        let path = project_dir.join(LOCAL_OVERRIDE_PATH);
        if !path.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml(&content, &path.display().to_string()).map(Some)
    }

    /// Return a new config with `overlay` applied on top of `self`.
    ///
    /// Configured overlay fields replace base fields wholesale (lists are
    /// never concatenated); enforcement flags merge key by key. `self` is
    /// left untouched.
    pub fn merged(&self, overlay: &Config) -> Config {
        let mut out = self.clone();
        out.command.merge_from(&overlay.command);
        out.edit.merge_from(&overlay.edit);
        out.allowlist.merge_from(&overlay.allowlist);
        out.prompt.merge_from(&overlay.prompt);
        out.post_edit.merge_from(&overlay.post_edit);
        out.session.merge_from(&overlay.session);
        for (k, v) in &overlay.enforcement {
            out.enforcement.insert(k.clone(), *v);
        }
        out
    }

    /// Render as TOML (used by `--dump-config`).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_else(|e| format!("# failed to render config: {e}\n"))
    }

    /// Apply an overlay from a TOML string. Used for testing.
    #[cfg(test)]
    fn merged_str(&self, toml_str: &str) -> Config {
        let overlay = Config::from_toml(toml_str, "test").unwrap();
        self.merged(&overlay)
    }
}
