use std::path::Path;
use std::time::Duration;

use log::debug;

use crate::config::PostEditConfig;
use crate::error::{GuardError, Result};
use crate::eval::{Context, Decision, Verdict};
use crate::guards::Guard;
use crate::hook::ToolEvent;
use crate::process::{Captured, run_with_timeout};
use crate::project::absolute_path;

const WRITE_TOOLS: &[&str] = &["Write", "Edit", "MultiEdit"];
const EXTENSIONS: &[&str] = &[".py"];
const FORMAT_COMMAND: &[&str] = &["ruff", "format"];
const LINT_COMMAND: &[&str] = &["ruff", "check", "--select=E,W,F"];
const TIMEOUT: Duration = Duration::from_millis(10_000);
const MAX_LINT_WARNINGS: usize = 5;

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Runs the formatter and linter over freshly written files and reports back.
///
/// Purely advisory: the verdict is always a continue, carrying any output
/// as additional context.
#[derive(Debug, Clone, PartialEq)]
pub struct PostEditGuard {
    write_tools: Vec<String>,
    extensions: Vec<String>,
    format_command: Vec<String>,
    lint_command: Vec<String>,
    timeout: Duration,
    max_lint_warnings: usize,
}

impl Default for PostEditGuard {
    fn default() -> Self {
        Self::from_config(&PostEditConfig::default())
    }
}

impl PostEditGuard {
    pub fn from_config(config: &PostEditConfig) -> Self {
        Self {
            write_tools: config.write_tools.clone().unwrap_or_else(|| owned(WRITE_TOOLS)),
            extensions: config.extensions.clone().unwrap_or_else(|| owned(EXTENSIONS)),
            format_command: config
                .format_command
                .clone()
                .unwrap_or_else(|| owned(FORMAT_COMMAND)),
            lint_command: config.lint_command.clone().unwrap_or_else(|| owned(LINT_COMMAND)),
            timeout: config.timeout_ms.map(Duration::from_millis).unwrap_or(TIMEOUT),
            max_lint_warnings: config.max_lint_warnings.unwrap_or(MAX_LINT_WARNINGS),
        }
    }

    /// Run `command` with `file` appended; `Ok(None)` when no command is configured.
    fn run_tool(&self, command: &[String], file: &Path, cwd: &Path) -> Result<Option<Captured>> {
        let Some((program, args)) = command.split_first() else {
            return Ok(None);
        };
        let file = file.to_string_lossy();
        let mut argv: Vec<&str> = args.iter().map(String::as_str).collect();
        argv.push(&file);
        run_with_timeout(program, &argv, cwd, self.timeout).map(Some)
    }

    fn format(&self, file: &Path, cwd: &Path) -> Result<Option<String>> {
        let Some(out) = self.run_tool(&self.format_command, file, cwd)? else {
            return Ok(None);
        };
        if !out.status.success() {
            return Err(GuardError::Process {
                program: self.format_command.join(" "),
                message: out.stderr.trim().to_string(),
            });
        }
        let name = file.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        Ok(Some(format!("{}: {name}", self.format_command.join(" "))))
    }

    fn lint(&self, file: &Path, cwd: &Path) -> Vec<String> {
        // Linters exit non-zero when they find something; only stdout matters.
        match self.run_tool(&self.lint_command, file, cwd) {
            Ok(Some(out)) => out
                .stdout
                .trim()
                .lines()
                .filter(|l| !l.trim().is_empty())
                .take(self.max_lint_warnings)
                .map(str::to_string)
                .collect(),
            Ok(None) => Vec::new(),
            Err(e) => {
                debug!("[post-edit] lint skipped: {e}");
                Vec::new()
            }
        }
    }

    /// The file to process, if this event concerns one.
    fn target(&self, event: &ToolEvent, project_dir: &Path) -> Option<std::path::PathBuf> {
        if !self.write_tools.iter().any(|t| t == &event.tool_name) {
            debug!("[post-edit] skip: not a write tool ({})", event.tool_name);
            return None;
        }
        if event.file_path.is_empty()
            || !self.extensions.iter().any(|ext| event.file_path.ends_with(ext.as_str()))
        {
            debug!("[post-edit] skip: extension not handled");
            return None;
        }
        let path = absolute_path(&event.file_path, project_dir);
        let Ok(canonical) = std::fs::canonicalize(&path) else {
            debug!("[post-edit] skip: file not found");
            return None;
        };
        let root = std::fs::canonicalize(project_dir).unwrap_or_else(|_| project_dir.to_path_buf());
        if !canonical.starts_with(&root) {
            debug!("[post-edit] skip: outside project");
            return None;
        }
        Some(canonical)
    }

    pub fn check(&self, event: &ToolEvent, project_dir: &Path) -> Verdict {
        let Some(file) = self.target(event, project_dir) else {
            return Verdict::bare(Decision::Continue);
        };
        let cwd = file.parent().unwrap_or(project_dir);

        let mut messages = Vec::new();
        match self.format(&file, cwd) {
            Ok(Some(message)) => messages.push(message),
            Ok(None) => {}
            Err(e) => debug!("[post-edit] format skipped: {e}"),
        }

        let warnings = self.lint(&file, cwd);
        if !warnings.is_empty() {
            messages.push(format!("lint warnings ({}):", warnings.len()));
            messages.extend(warnings.iter().map(|w| format!("  {w}")));
        }

        if messages.is_empty() {
            Verdict::bare(Decision::Continue)
        } else {
            Verdict::continue_with(messages.join("\n"))
        }
    }
}

impl Guard for PostEditGuard {
    fn evaluate(&self, event: &ToolEvent, ctx: &Context) -> Result<Verdict> {
        Ok(self.check(event, &ctx.project_dir))
    }
}
