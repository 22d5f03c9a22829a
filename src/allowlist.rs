//! File-access authorization: which paths the active task may edit.
//!
//! A task's spec document lists its files under an `## Allowed Files`
//! heading. Entries are literal paths or globs; a few project files are
//! always editable regardless of the spec.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use log::debug;
use regex::Regex;

use crate::config::AllowlistConfig;
use crate::error::{GuardError, Result};
use crate::eval::matcher::CompiledRegex;
use crate::process::run_with_timeout;

/// Files every task may touch.
pub const ALWAYS_ALLOWED: &[&str] = &[
    "ai/features/*.md",
    "ai/backlog.md",
    "ai/diary/**",
    ".gitignore",
    "pyproject.toml",
    ".claude/**",
];

pub const TASK_ID_PATTERN: &str = r"(?i)(FTR|BUG|TECH|ARCH|SEC)-\d+";
pub const SPEC_DIR: &str = "ai/features";
pub const GIT_TIMEOUT: Duration = Duration::from_millis(5000);

// ── Glob engine ──

/// Translate a glob into an anchored regex.
///
/// `**` matches across `/`, `*` and `?` stay within one segment, and every
/// other character is literal (no character classes).
pub fn glob_to_regex(pattern: &str) -> String {
    let mut re = String::with_capacity(pattern.len() * 2 + 2);
    re.push('^');
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                re.push_str(".*");
            }
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            other => re.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    re.push('$');
    re
}

/// Whether `path` matches glob `pattern` in full.
pub fn glob_matches(path: &str, pattern: &str) -> bool {
    Regex::new(&glob_to_regex(pattern)).is_ok_and(|re| re.is_match(path))
}

// ── Spec parsing ──

static LIST_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[-*+]|\d+\.)\s+").expect("built-in pattern must compile")
});
// Stops at the first character outside the class; `?`, `[` and `]` in a
// listed path therefore truncate the entry.
static PATH_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[`*]*([a-zA-Z0-9_./@*-]+(?::\d+(?:-\d+)?)?)[`*]*")
        .expect("built-in pattern must compile")
});
static LINE_RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":\d+(?:-\d+)?$").expect("built-in pattern must compile"));

fn is_allowed_files_heading(line: &str) -> bool {
    let line = line.trim();
    line.starts_with("##")
        && line
            .trim_start_matches('#')
            .trim()
            .eq_ignore_ascii_case("allowed files")
}

/// `***`, `- - -`, `___` and friends.
fn is_thematic_break(line: &str) -> bool {
    line.chars()
        .all(|c| matches!(c, '*' | '-' | '_') || c.is_whitespace())
}

/// `|---|:--:|`
fn is_table_separator(line: &str) -> bool {
    line.starts_with('|')
        && line.contains('-')
        && line
            .chars()
            .all(|c| matches!(c, '|' | '-' | ':') || c.is_whitespace())
}

/// Pull the allowed entries out of a spec document.
///
/// Returns an empty list when there is no `## Allowed Files` section or the
/// section has no parseable entries. Line-range suffixes (`:10-20`) are
/// informational and dropped. Thematic breaks and table header or
/// separator rows contribute nothing.
pub fn extract_allowed_files(content: &str) -> Vec<String> {
    let mut lines = content.lines();
    if !lines.by_ref().any(is_allowed_files_heading) {
        return Vec::new();
    }
    let section: Vec<&str> = lines
        .take_while(|l| !l.starts_with("##"))
        .map(str::trim)
        .collect();

    let mut allowed = Vec::new();
    for (i, &line) in section.iter().enumerate() {
        if line.is_empty() || line.starts_with('#') || is_thematic_break(line) {
            continue;
        }
        if line.starts_with('|') {
            let is_header = section.get(i + 1).is_some_and(|next| is_table_separator(next));
            if is_header || is_table_separator(line) {
                continue;
            }
        }
        let body = LIST_MARKER.replace(line, "");
        let Some(token) = PATH_TOKEN.captures(&body).and_then(|c| c.get(1)) else {
            continue;
        };
        let entry = LINE_RANGE.replace(token.as_str(), "");
        if !entry.is_empty() && !entry.chars().all(|c| c == '*') {
            allowed.push(entry.into_owned());
        }
    }
    allowed
}

/// Allowed entries of one spec document, read fresh on every call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecAllowlist {
    pub patterns: Vec<String>,
    /// Set when the spec could not be read; callers must deny.
    pub error: Option<String>,
}

pub fn resolve_allowlist(spec_path: &Path) -> SpecAllowlist {
    match read_spec(spec_path) {
        Ok(content) => SpecAllowlist {
            patterns: extract_allowed_files(&content),
            error: None,
        },
        Err(e) => SpecAllowlist {
            patterns: Vec::new(),
            error: Some(e.to_string()),
        },
    }
}

fn read_spec(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| GuardError::SpecUnreadable {
        path: path.to_path_buf(),
        source,
    })
}

// ── Authorization ──

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAccess {
    pub allowed: bool,
    /// The spec's entries, for the deny message.
    pub allowed_files: Vec<String>,
    pub error: Option<String>,
}

impl FileAccess {
    fn granted(allowed_files: Vec<String>) -> Self {
        Self {
            allowed: true,
            allowed_files,
            error: None,
        }
    }
}

fn strip_dot_prefix(path: &str) -> &str {
    let mut p = path;
    while let Some(rest) = p.strip_prefix("./") {
        p = rest;
    }
    p
}

fn entry_allows(path: &str, entry: &str) -> bool {
    let entry = strip_dot_prefix(entry);
    if path == entry || glob_matches(path, entry) {
        return true;
    }
    // A listed directory also covers everything below it.
    let dir = entry.strip_suffix("/*").unwrap_or(entry);
    path.starts_with(&format!("{dir}/"))
}

/// Decide whether `rel_path` may be edited under `spec_path`.
///
/// Always-allowed patterns win first. No spec, or a spec without entries,
/// allows everything; an unreadable spec allows nothing.
pub fn is_file_allowed(
    rel_path: &str,
    spec_path: Option<&Path>,
    always_allowed: &[String],
) -> FileAccess {
    let path = strip_dot_prefix(rel_path);

    if always_allowed.iter().any(|p| glob_matches(path, p)) {
        return FileAccess::granted(Vec::new());
    }

    let Some(spec_path) = spec_path else {
        return FileAccess::granted(Vec::new());
    };

    let allowlist = resolve_allowlist(spec_path);
    if let Some(error) = allowlist.error {
        return FileAccess {
            allowed: false,
            allowed_files: Vec::new(),
            error: Some(error),
        };
    }
    if allowlist.patterns.is_empty() {
        return FileAccess::granted(Vec::new());
    }

    let allowed = allowlist.patterns.iter().any(|e| entry_allows(path, e));
    FileAccess {
        allowed,
        allowed_files: allowlist.patterns,
        error: None,
    }
}

// ── Settings ──

/// Compiled `[allowlist]` section.
#[derive(Debug, Clone)]
pub struct AllowlistRules {
    pub always_allowed: Vec<String>,
    pub task_id: CompiledRegex,
    pub spec_dir: String,
    pub git_timeout: Duration,
}

impl Default for AllowlistRules {
    fn default() -> Self {
        Self {
            always_allowed: ALWAYS_ALLOWED.iter().map(|s| s.to_string()).collect(),
            task_id: CompiledRegex::new(TASK_ID_PATTERN).expect("built-in pattern must compile"),
            spec_dir: SPEC_DIR.to_string(),
            git_timeout: GIT_TIMEOUT,
        }
    }
}

impl AllowlistRules {
    pub fn from_config(config: &AllowlistConfig) -> Result<Self> {
        let fallback = Self::default();
        Ok(Self {
            always_allowed: config.always_allowed.clone().unwrap_or(fallback.always_allowed),
            task_id: match &config.task_id_pattern {
                Some(pattern) => CompiledRegex::new(pattern)?,
                None => fallback.task_id,
            },
            spec_dir: config.spec_dir.clone().unwrap_or(fallback.spec_dir),
            git_timeout: config
                .git_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(fallback.git_timeout),
        })
    }

    /// Locator that reads the task ID from `project_dir`'s current branch.
    pub fn branch_locator(&self, project_dir: &Path) -> GitBranchLocator {
        GitBranchLocator {
            project_dir: project_dir.to_path_buf(),
            spec_dir: self.spec_dir.clone(),
            task_id: self.task_id.clone(),
            timeout: self.git_timeout,
        }
    }
}

// ── Spec discovery ──

/// Finds the spec document for the task in progress.
pub trait SpecLocator {
    fn active_spec(&self) -> Option<PathBuf>;
}

/// Never finds a spec: every edit passes the allowlist check.
#[derive(Debug, Default)]
pub struct NoSpec;

impl SpecLocator for NoSpec {
    fn active_spec(&self) -> Option<PathBuf> {
        None
    }
}

/// Always reports the same spec.
#[derive(Debug)]
pub struct FixedSpec(pub PathBuf);

impl SpecLocator for FixedSpec {
    fn active_spec(&self) -> Option<PathBuf> {
        Some(self.0.clone())
    }
}

/// Infers the spec from a task ID in the current git branch name.
#[derive(Debug)]
pub struct GitBranchLocator {
    pub project_dir: PathBuf,
    pub spec_dir: String,
    pub task_id: CompiledRegex,
    pub timeout: Duration,
}

impl SpecLocator for GitBranchLocator {
    fn active_spec(&self) -> Option<PathBuf> {
        let branch = match current_branch(&self.project_dir, self.timeout) {
            Ok(branch) => branch,
            Err(e) => {
                debug!("[spec] branch lookup failed: {e}");
                return None;
            }
        };
        let task_id = task_id_from_branch(&branch, &self.task_id)?;
        spec_for_task(&self.project_dir.join(&self.spec_dir), &task_id)
    }
}

fn current_branch(cwd: &Path, timeout: Duration) -> Result<String> {
    let out = run_with_timeout("git", &["branch", "--show-current"], cwd, timeout)?;
    if !out.status.success() {
        return Err(GuardError::Process {
            program: "git".into(),
            message: out.stderr.trim().to_string(),
        });
    }
    Ok(out.stdout.trim().to_string())
}

/// Upper-cased task ID found in a branch name, e.g. `feature/ftr-042-x` → `FTR-042`.
pub fn task_id_from_branch(branch: &str, pattern: &CompiledRegex) -> Option<String> {
    if branch.is_empty() {
        return None;
    }
    let found = match pattern {
        CompiledRegex::Linear(re) => re.find(branch).map(|m| m.as_str().to_string()),
        CompiledRegex::Backtracking(re) => {
            re.find(branch).ok().flatten().map(|m| m.as_str().to_string())
        }
    };
    found.map(|id| id.to_uppercase())
}

/// First `<ID>-*.md` file (by name) in `spec_dir`.
pub fn spec_for_task(spec_dir: &Path, task_id: &str) -> Option<PathBuf> {
    let prefix = format!("{task_id}-");
    let mut names: Vec<String> = std::fs::read_dir(spec_dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.starts_with(&prefix) && name.ends_with(".md"))
        .collect();
    names.sort();
    names.first().map(|name| spec_dir.join(name))
}
