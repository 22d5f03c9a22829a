use std::path::Path;

use log::debug;
use serde_json::Value;

use crate::allowlist::{AllowlistRules, FileAccess, is_file_allowed};
use crate::config::{AllowlistConfig, EditConfig};
use crate::error::Result;
use crate::eval::{Context, Verdict};
use crate::guards::Guard;
use crate::hook::ToolEvent;
use crate::loc::{Limits, count_lines};
use crate::project::{absolute_path, relative_path};

const PROTECTED_PATHS: &[&str] = &["tests/contracts/", "tests/regression/"];
const PLAN_GATED_PATHS: &[&str] = &["src/"];
const PROGRESS_STATE_FILE: &str = "autopilot-state.json";
const SYNC_ZONES: &[&str] = &[".claude/", "scripts/"];
const SYNC_UPSTREAM_DIR: &str = "template";
const EXCLUDE_FROM_SYNC: &[&str] = &[
    ".claude/rules/localization.md",
    ".claude/rules/template-sync.md",
    ".claude/rules/git-local-folders.md",
    ".claude/CUSTOMIZATIONS.md",
    ".claude/settings.local.json",
];

/// Enforcement flag gating the plan check.
pub const REQUIRE_PLAN_FLAG: &str = "require_plan_before_code";

/// Allowed entries shown in a deny message.
const MAX_LISTED: usize = 10;

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Checks run before a file is written, in order:
/// allowlist, protected paths, plan gate, size, sync zone.
#[derive(Debug, Clone)]
pub struct EditGuard {
    pub allowlist: AllowlistRules,
    protected_paths: Vec<String>,
    limits: Limits,
    plan_gated_paths: Vec<String>,
    progress_state_file: String,
    sync_zones: Vec<String>,
    sync_upstream_dir: String,
    exclude_from_sync: Vec<String>,
}

impl Default for EditGuard {
    fn default() -> Self {
        Self {
            allowlist: AllowlistRules::default(),
            protected_paths: owned(PROTECTED_PATHS),
            limits: Limits::default(),
            plan_gated_paths: owned(PLAN_GATED_PATHS),
            progress_state_file: PROGRESS_STATE_FILE.to_string(),
            sync_zones: owned(SYNC_ZONES),
            sync_upstream_dir: SYNC_UPSTREAM_DIR.to_string(),
            exclude_from_sync: owned(EXCLUDE_FROM_SYNC),
        }
    }
}

impl EditGuard {
    pub fn from_config(edit: &EditConfig, allowlist: &AllowlistConfig) -> Result<Self> {
        let d = Self::default();
        Ok(Self {
            allowlist: AllowlistRules::from_config(allowlist)?,
            protected_paths: edit.protected_paths.clone().unwrap_or(d.protected_paths),
            limits: Limits::new(
                edit.max_lines_code.unwrap_or(d.limits.max_lines_code),
                edit.max_lines_test.unwrap_or(d.limits.max_lines_test),
                edit.warn_fraction.unwrap_or(d.limits.warn_fraction),
            )?,
            plan_gated_paths: edit.plan_gated_paths.clone().unwrap_or(d.plan_gated_paths),
            progress_state_file: edit
                .progress_state_file
                .clone()
                .unwrap_or(d.progress_state_file),
            sync_zones: edit.sync_zones.clone().unwrap_or(d.sync_zones),
            sync_upstream_dir: edit.sync_upstream_dir.clone().unwrap_or(d.sync_upstream_dir),
            exclude_from_sync: edit.exclude_from_sync.clone().unwrap_or(d.exclude_from_sync),
        })
    }

    fn check_allowlist(&self, rel: &str, ctx: &Context) -> Option<Verdict> {
        let spec = ctx.active_spec();
        let access = is_file_allowed(rel, spec.as_deref(), &self.allowlist.always_allowed);
        if access.allowed {
            return None;
        }
        let spec_label = spec
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(not found)".into());
        debug!("[pre-edit] deny: not in allowed files ({rel})");
        Some(Verdict::deny(allowlist_message(rel, &spec_label, &access)))
    }

    fn check_protected(&self, rel: &str) -> Option<Verdict> {
        self.protected_paths.iter().find(|p| rel.starts_with(p.as_str()))?;
        debug!("[pre-edit] deny: protected path ({rel})");
        Some(Verdict::deny(format!(
            "Protected test file!\n\n{rel}\n\n\
             {} cannot be modified.\nFix the code, not the test.\n\n\
             See: CLAUDE.md -> Test Safety",
            self.protected_paths.join(" and ")
        )))
    }

    fn check_plan(&self, rel: &str, ctx: &Context) -> Option<Verdict> {
        if !ctx.rules.flag(REQUIRE_PLAN_FLAG, true) {
            return None;
        }
        if !self.plan_gated_paths.iter().any(|p| rel.starts_with(p.as_str())) {
            return None;
        }
        let state = ctx.project_dir.join(&self.progress_state_file);
        if plan_exists(&state) != Some(false) {
            return None;
        }
        debug!("[pre-edit] deny: no plan yet ({rel})");
        Some(Verdict::deny(format!(
            "No plan yet!\n\n{rel}\n\n\
             {} reports plan_exists: false.\n\
             Write the plan before touching source code.\n\n\
             See: CLAUDE.md -> Autopilot",
            self.progress_state_file
        )))
    }

    fn check_size(&self, file_path: &str, rel: &str, project_dir: &Path) -> Option<Verdict> {
        let path = absolute_path(file_path, project_dir);
        if !path.is_file() {
            return None;
        }
        let loc = count_lines(&path);
        let verdict = self.limits.check(rel, loc);
        if verdict.is_some() {
            debug!("[pre-edit] ask: loc {loc} ({rel})");
        }
        verdict
    }

    fn check_sync_zone(&self, rel: &str, project_dir: &Path) -> Option<Verdict> {
        if !self.sync_zones.iter().any(|z| rel.starts_with(z.as_str())) {
            return None;
        }
        if self.exclude_from_sync.iter().any(|e| e == rel) {
            return None;
        }
        let upstream = project_dir.join(&self.sync_upstream_dir).join(rel);
        if !upstream.exists() {
            return None;
        }
        debug!("[pre-edit] ask: sync zone ({rel})");
        let dir = &self.sync_upstream_dir;
        Some(Verdict::ask(format!(
            "SYNC ZONE: {rel}\n\n\
             This file exists in {dir}/{rel}\n\
             Remember to sync changes bidirectionally.\n\n\
             See: .claude/rules/template-sync.md"
        )))
    }

    pub fn check(&self, file_path: &str, ctx: &Context) -> Verdict {
        if file_path.is_empty() {
            return Verdict::allow();
        }
        let rel = relative_path(file_path, &ctx.project_dir);
        debug!("[pre-edit] file={rel}");

        self.check_allowlist(&rel, ctx)
            .or_else(|| self.check_protected(&rel))
            .or_else(|| self.check_plan(&rel, ctx))
            .or_else(|| self.check_size(file_path, &rel, &ctx.project_dir))
            .or_else(|| self.check_sync_zone(&rel, &ctx.project_dir))
            .unwrap_or_else(Verdict::allow)
    }
}

impl Guard for EditGuard {
    fn evaluate(&self, event: &ToolEvent, ctx: &Context) -> Result<Verdict> {
        Ok(self.check(&event.file_path, ctx))
    }
}

fn allowlist_message(rel: &str, spec: &str, access: &FileAccess) -> String {
    if let Some(error) = &access.error {
        return format!(
            "Spec unreadable!\n\n{rel}\n\nSpec: {spec}\n\n{error}\n\n\
             Edits are blocked until the spec can be read."
        );
    }
    let mut listed: Vec<String> = access
        .allowed_files
        .iter()
        .take(MAX_LISTED)
        .map(|f| format!("  - {f}"))
        .collect();
    if access.allowed_files.len() > MAX_LISTED {
        listed.push(format!("  ... and {} more", access.allowed_files.len() - MAX_LISTED));
    }
    format!(
        "File not in Allowed Files!\n\n{rel}\n\nSpec: {spec}\n\n\
         Allowed files:\n{}\n\n\
         To fix:\n\
         1. Edit {spec}\n\
         2. Find ## Allowed Files section\n\
         3. Add: `{rel}` - {{description}}\n\
         4. Save and retry\n\n\
         Or change approach to use only allowed files.",
        listed.join("\n")
    )
}

/// `plan_exists` from the progress state; `None` when absent or unreadable.
fn plan_exists(state_path: &Path) -> Option<bool> {
    read_plan_state(state_path).unwrap_or_else(|e| {
        debug!("[pre-edit] ignoring {}: {e}", state_path.display());
        None
    })
}

fn read_plan_state(state_path: &Path) -> Result<Option<bool>> {
    let content = match std::fs::read_to_string(state_path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let state: Value = serde_json::from_str(&content)?;
    Ok(state.get("plan_exists").and_then(Value::as_bool))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allowlist::FixedSpec;
    use crate::error::GuardError;
    use crate::eval::{Decision, RuleSet};
    use std::path::PathBuf;

    struct Project {
        dir: tempfile::TempDir,
    }

    impl Project {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn path(&self) -> &Path {
            self.dir.path()
        }

        fn write(&self, rel: &str, content: &str) -> PathBuf {
            let path = self.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, content).unwrap();
            path
        }

        fn ctx(&self) -> Context {
            Context::new(RuleSet::defaults(), self.path().to_path_buf())
        }
    }

    fn lines(n: usize) -> String {
        "x = 1\n".repeat(n)
    }

    fn guard() -> EditGuard {
        RuleSet::defaults().edit
    }

    // ── allowlist ──

    #[test]
    fn no_spec_allows() {
        let p = Project::new();
        assert_eq!(guard().check("src/anything.py", &p.ctx()), Verdict::allow());
    }

    #[test]
    fn spec_denies_unlisted_file() {
        let p = Project::new();
        let spec = p.write("ai/features/FTR-1-x.md", "## Allowed Files\n`src/a.py`\n`src/b.py`\n");
        let ctx = p.ctx().with_spec_path(spec.clone());
        let verdict = guard().check("src/c.py", &ctx);
        assert_eq!(verdict.decision, Decision::Deny);
        let reason = verdict.reason();
        assert!(reason.starts_with("File not in Allowed Files!"));
        assert!(reason.contains("  - src/a.py\n  - src/b.py"));
        assert!(reason.contains(&format!("Spec: {}", spec.display())));
    }

    #[test]
    fn spec_allows_listed_absolute_path() {
        let p = Project::new();
        let spec = p.write("spec.md", "## Allowed Files\n`src/a.py`\n");
        let ctx = p.ctx().with_spec_path(spec);
        let abs = p.path().join("src/a.py");
        assert_eq!(guard().check(&abs.to_string_lossy(), &ctx), Verdict::allow());
    }

    #[test]
    fn deny_lists_at_most_ten() {
        let p = Project::new();
        let entries: String = (0..12).map(|i| format!("`src/f{i}.py`\n")).collect();
        let spec = p.write("spec.md", &format!("## Allowed Files\n{entries}"));
        let ctx = p.ctx().with_spec_path(spec);
        let reason = guard().check("src/other.py", &ctx).reason().to_string();
        assert!(reason.contains("  - src/f9.py"));
        assert!(!reason.contains("  - src/f10.py"));
        assert!(reason.contains("... and 2 more"));
    }

    #[test]
    fn unreadable_spec_denies() {
        let p = Project::new();
        let ctx = p.ctx().with_spec_path(p.path().join("missing.md"));
        let verdict = guard().check("src/a.py", &ctx);
        assert_eq!(verdict.decision, Decision::Deny);
        assert!(verdict.reason().contains("Spec unreadable!"));
    }

    #[test]
    fn located_spec_is_used() {
        let p = Project::new();
        let spec = p.write("ai/features/BUG-3-x.md", "## Allowed Files\n`src/a.py`\n");
        let ctx = p.ctx().with_locator(FixedSpec(spec));
        assert_eq!(guard().check("src/b.py", &ctx).decision, Decision::Deny);
        assert_eq!(guard().check("ai/backlog.md", &ctx), Verdict::allow());
    }

    // ── protected paths ──

    #[test]
    fn protected_paths_deny() {
        let p = Project::new();
        for path in ["tests/contracts/x.py", "tests/regression/y.py"] {
            let verdict = guard().check(path, &p.ctx());
            assert_eq!(verdict.decision, Decision::Deny, "{path}");
            assert!(verdict.reason().contains("tests/contracts/"));
        }
        assert_eq!(guard().check("tests/unit/x.py", &p.ctx()), Verdict::allow());
    }

    #[test]
    fn protected_wins_over_spec_listing() {
        let p = Project::new();
        let spec = p.write("spec.md", "## Allowed Files\n`tests/contracts/x.py`\n");
        let ctx = p.ctx().with_spec_path(spec);
        assert_eq!(guard().check("tests/contracts/x.py", &ctx).decision, Decision::Deny);
    }

    // ── plan gate ──

    #[test]
    fn plan_missing_denies_source_edit() {
        let p = Project::new();
        p.write("autopilot-state.json", r#"{"plan_exists": false}"#);
        let verdict = guard().check("src/app.py", &p.ctx());
        assert_eq!(verdict.decision, Decision::Deny);
        assert!(verdict.reason().starts_with("No plan yet!"));
        assert_eq!(guard().check("docs/readme.md", &p.ctx()), Verdict::allow());
    }

    #[test]
    fn plan_gate_fails_open() {
        for state in [
            r#"{"plan_exists": true}"#,
            r#"{"other": 1}"#,
            "not json",
            r#"{"plan_exists": "no"}"#,
        ] {
            let p = Project::new();
            p.write("autopilot-state.json", state);
            assert_eq!(guard().check("src/app.py", &p.ctx()), Verdict::allow(), "{state}");
        }
    }

    #[test]
    fn plan_gate_respects_enforcement_flag() {
        let p = Project::new();
        p.write("autopilot-state.json", r#"{"plan_exists": false}"#);
        let mut rules = RuleSet::defaults();
        rules.enforcement.insert(REQUIRE_PLAN_FLAG.into(), false);
        let ctx = Context::new(rules, p.path().to_path_buf());
        assert_eq!(guard().check("src/app.py", &ctx), Verdict::allow());
    }

    // ── size ──

    #[test]
    fn size_boundaries() {
        let p = Project::new();
        let cases = [
            (349, Decision::Allow),
            (350, Decision::Ask),
            (399, Decision::Ask),
            (400, Decision::Ask),
        ];
        for (n, expected) in cases {
            p.write("lib/mod.py", &lines(n));
            assert_eq!(guard().check("lib/mod.py", &p.ctx()).decision, expected, "{n} lines");
        }
    }

    #[test]
    fn test_files_get_higher_ceiling() {
        let p = Project::new();
        p.write("main.py", &lines(401));
        p.write("main_test.py", &lines(401));
        let ask = guard().check("main.py", &p.ctx());
        assert_eq!(ask.decision, Decision::Ask);
        assert!(ask.reason().contains("main.py: 401 lines (limit: 400)"));
        assert_eq!(guard().check("main_test.py", &p.ctx()), Verdict::allow());
    }

    #[test]
    fn missing_file_skips_size() {
        let p = Project::new();
        assert_eq!(guard().check("lib/new.py", &p.ctx()), Verdict::allow());
    }

    // ── sync zone ──

    #[test]
    fn sync_zone_asks_when_upstream_exists() {
        let p = Project::new();
        p.write("template/scripts/deploy.sh", "#!/bin/sh\n");
        let verdict = guard().check("scripts/deploy.sh", &p.ctx());
        assert_eq!(verdict.decision, Decision::Ask);
        assert!(verdict.reason().starts_with("SYNC ZONE: scripts/deploy.sh"));
        assert!(verdict.reason().contains("template/scripts/deploy.sh"));
    }

    #[test]
    fn sync_zone_silent_without_upstream_or_when_excluded() {
        let p = Project::new();
        assert_eq!(guard().check("scripts/deploy.sh", &p.ctx()), Verdict::allow());
        p.write("template/.claude/settings.local.json", "{}");
        assert_eq!(
            guard().check(".claude/settings.local.json", &p.ctx()),
            Verdict::allow()
        );
    }

    #[test]
    fn empty_path_allows() {
        let p = Project::new();
        assert_eq!(guard().check("", &p.ctx()), Verdict::allow());
    }

    #[test]
    fn configured_limits() {
        let edit = EditConfig {
            max_lines_code: Some(10),
            warn_fraction: Some(1.0),
            ..Default::default()
        };
        let guard = EditGuard::from_config(&edit, &AllowlistConfig::default()).unwrap();
        let p = Project::new();
        p.write("a.py", &lines(9));
        assert_eq!(guard.check("a.py", &p.ctx()), Verdict::allow());
        p.write("a.py", &lines(10));
        assert_eq!(guard.check("a.py", &p.ctx()).decision, Decision::Ask);
    }

    #[test]
    fn degenerate_limits_rejected_at_load() {
        for edit in [
            EditConfig {
                max_lines_code: Some(0),
                ..Default::default()
            },
            EditConfig {
                warn_fraction: Some(0.0),
                ..Default::default()
            },
            EditConfig {
                warn_fraction: Some(f64::NAN),
                ..Default::default()
            },
        ] {
            assert!(matches!(
                EditGuard::from_config(&edit, &AllowlistConfig::default()),
                Err(GuardError::InvalidRule(_))
            ));
        }
    }

    #[test]
    fn unparseable_state_is_json_error() {
        let p = Project::new();
        let state = p.write("autopilot-state.json", "not json");
        assert!(matches!(read_plan_state(&state), Err(GuardError::Json(_))));
        assert_eq!(read_plan_state(&p.path().join("absent.json")).unwrap(), None);
    }
}
