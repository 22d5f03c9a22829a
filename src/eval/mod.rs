pub mod decision;
pub mod matcher;

pub use decision::{Decision, Verdict};
pub use matcher::{Matcher, Rule};

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::allowlist::{NoSpec, SpecLocator};
use crate::config::Config;
use crate::error::Result;
use crate::guards::command::CommandGuard;
use crate::guards::edit::EditGuard;
use crate::guards::post_edit::PostEditGuard;
use crate::guards::prompt::PromptGuard;
use crate::guards::session::SessionGuard;
use crate::logging::log_hook_error;
use crate::project;

/// Env var holding an explicit spec document path.
pub const SPEC_PATH_ENV: &str = "CLAUDE_CURRENT_SPEC_PATH";

/// Every guard compiled from one effective configuration.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub command: CommandGuard,
    pub edit: EditGuard,
    pub prompt: PromptGuard,
    pub post_edit: PostEditGuard,
    pub session: SessionGuard,
    pub enforcement: BTreeMap<String, bool>,
}

impl RuleSet {
    /// Compile `config`. Unset fields fall back to built-in constants;
    /// any pattern or rule that fails to compile fails the whole set.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            command: CommandGuard::from_config(&config.command)?,
            edit: EditGuard::from_config(&config.edit, &config.allowlist)?,
            prompt: PromptGuard::from_config(&config.prompt)?,
            post_edit: PostEditGuard::from_config(&config.post_edit),
            session: SessionGuard::from_config(&config.session),
            enforcement: config.enforcement.clone(),
        })
    }

    /// The embedded defaults, or the built-in fallbacks if those fail.
    pub fn defaults() -> Self {
        Config::default_config()
            .and_then(|c| Self::from_config(&c))
            .unwrap_or_default()
    }

    /// Effective rules for `project_dir`. See [`load_layered`].
    pub fn load(project_dir: &Path) -> Self {
        load_layered(project_dir).1
    }

    /// Value of an enforcement flag, or `default` when it is not configured.
    pub fn flag(&self, name: &str, default: bool) -> bool {
        self.enforcement.get(name).copied().unwrap_or(default)
    }
}

/// Build the effective configuration and its compiled rules.
///
/// Three layers, first that works wins: defaults with the project overlay
/// merged in, defaults alone, then an empty configuration (every guard on
/// its built-in fallbacks). Each failure is logged.
pub fn load_layered(project_dir: &Path) -> (Config, RuleSet) {
    let defaults = match Config::default_config() {
        Ok(config) => config,
        Err(e) => {
            log_hook_error("config", &e);
            return (Config::default(), RuleSet::default());
        }
    };

    match Config::load_overlay(project_dir) {
        Ok(Some(overlay)) => {
            let merged = defaults.merged(&overlay);
            match RuleSet::from_config(&merged) {
                Ok(rules) => return (merged, rules),
                Err(e) => log_hook_error("config", &e),
            }
        }
        Ok(None) => {}
        Err(e) => log_hook_error("config", &e),
    }

    match RuleSet::from_config(&defaults) {
        Ok(rules) => (defaults, rules),
        Err(e) => {
            log_hook_error("config", &e);
            (Config::default(), RuleSet::default())
        }
    }
}

/// Resolve an explicit spec reference: `~` expands, relative paths are
/// taken from the project root, empty means none.
pub fn resolve_spec_path(raw: &str, project_dir: &Path) -> Option<PathBuf> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let expanded = PathBuf::from(shellexpand::tilde(raw).into_owned());
    Some(if expanded.is_absolute() {
        expanded
    } else {
        project_dir.join(expanded)
    })
}

/// Everything a guard may consult besides the event itself.
///
/// Built once per process; nothing in it changes afterwards.
pub struct Context {
    pub rules: RuleSet,
    pub project_dir: PathBuf,
    spec_path: Option<PathBuf>,
    locator: Box<dyn SpecLocator>,
}

impl Context {
    /// Rules and paths without touching the environment or git.
    pub fn new(rules: RuleSet, project_dir: PathBuf) -> Self {
        Self {
            rules,
            project_dir,
            spec_path: None,
            locator: Box::new(NoSpec),
        }
    }

    /// The context a hook process runs with.
    pub fn from_env() -> Self {
        let project_dir = project::project_dir();
        let rules = RuleSet::load(&project_dir);
        let spec_path = std::env::var(SPEC_PATH_ENV)
            .ok()
            .and_then(|raw| resolve_spec_path(&raw, &project_dir));
        let locator = Box::new(rules.edit.allowlist.branch_locator(&project_dir));
        Self {
            rules,
            project_dir,
            spec_path,
            locator,
        }
    }

    pub fn with_spec_path(mut self, path: PathBuf) -> Self {
        self.spec_path = Some(path);
        self
    }

    pub fn with_locator(mut self, locator: impl SpecLocator + 'static) -> Self {
        self.locator = Box::new(locator);
        self
    }

    /// The explicit spec if one was given, else whatever the locator finds.
    pub fn active_spec(&self) -> Option<PathBuf> {
        self.spec_path
            .clone()
            .or_else(|| self.locator.active_spec())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("project_dir", &self.project_dir)
            .field("spec_path", &self.spec_path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allowlist::FixedSpec;
    use crate::config::LOCAL_OVERRIDE_PATH;

    fn project_with_overlay(toml: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOCAL_OVERRIDE_PATH);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, toml).unwrap();
        dir
    }

    fn push_main(rules: &RuleSet) -> Decision {
        rules.command.check("git push origin main").decision
    }

    #[test]
    fn fallback_rules_still_protect() {
        assert_eq!(push_main(&RuleSet::default()), Decision::Deny);
        assert_eq!(push_main(&RuleSet::defaults()), Decision::Deny);
    }

    #[test]
    fn defaults_carry_enforcement() {
        let rules = RuleSet::defaults();
        assert!(rules.flag("require_plan_before_code", false));
        assert!(!rules.flag("require_acceptance_verification", true));
        assert!(rules.flag("unknown_flag", true));
    }

    #[test]
    fn no_overlay_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, _) = load_layered(dir.path());
        assert_eq!(config, Config::default_config().unwrap());
    }

    #[test]
    fn overlay_applies() {
        let dir = project_with_overlay("[command]\nblock = []\n");
        let rules = RuleSet::load(dir.path());
        assert_eq!(push_main(&rules), Decision::Allow);
    }

    #[test]
    fn malformed_overlay_falls_back_to_defaults() {
        let dir = project_with_overlay("[command\nblock = ");
        let (config, rules) = load_layered(dir.path());
        assert_eq!(config, Config::default_config().unwrap());
        assert_eq!(push_main(&rules), Decision::Deny);
    }

    #[test]
    fn uncompilable_overlay_falls_back_to_defaults() {
        let dir = project_with_overlay("[[command.block]]\npattern = \"(\"\nmessage = \"x\"\n");
        let (config, rules) = load_layered(dir.path());
        assert_eq!(config, Config::default_config().unwrap());
        assert_eq!(push_main(&rules), Decision::Deny);
    }

    #[test]
    fn loading_is_idempotent() {
        let dir = project_with_overlay("[edit]\nmax_lines_code = 100\n");
        let (first, _) = load_layered(dir.path());
        let (second, _) = load_layered(dir.path());
        assert_eq!(first, second);
        assert_eq!(first.edit.max_lines_code, Some(100));
    }

    #[test]
    fn spec_path_resolution() {
        let root = Path::new("/tmp/proj");
        assert_eq!(resolve_spec_path("", root), None);
        assert_eq!(resolve_spec_path("  ", root), None);
        assert_eq!(
            resolve_spec_path("ai/features/FTR-1.md", root),
            Some(PathBuf::from("/tmp/proj/ai/features/FTR-1.md"))
        );
        assert_eq!(
            resolve_spec_path("/abs/spec.md", root),
            Some(PathBuf::from("/abs/spec.md"))
        );
    }

    #[test]
    fn explicit_spec_beats_locator() {
        let ctx = Context::new(RuleSet::default(), PathBuf::from("/tmp/proj"))
            .with_locator(FixedSpec(PathBuf::from("/located.md")));
        assert_eq!(ctx.active_spec(), Some(PathBuf::from("/located.md")));
        let ctx = ctx.with_spec_path(PathBuf::from("/explicit.md"));
        assert_eq!(ctx.active_spec(), Some(PathBuf::from("/explicit.md")));
    }

    #[test]
    fn new_context_has_no_spec() {
        let ctx = Context::new(RuleSet::default(), PathBuf::from("/tmp/proj"));
        assert_eq!(ctx.active_spec(), None);
    }
}
