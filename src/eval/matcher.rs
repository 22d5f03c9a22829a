//! Rule matchers: regexes (auto-selecting engine) and named predicates.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::RuleConfig;
use crate::error::{GuardError, Result};

/// A compiled regex that auto-selects between linear-time and backtracking engines.
///
/// Rules written for the hooks lean on lookaround (`(?<!...)`, `(?=...)`),
/// which only `fancy_regex` supports; everything else stays on the
/// linear-time `regex` crate.
#[derive(Debug, Clone)]
pub enum CompiledRegex {
    Linear(regex::Regex),
    Backtracking(fancy_regex::Regex),
}

impl CompiledRegex {
    pub fn new(pattern: &str) -> Result<Self> {
        let compiled = if needs_backtracking_engine(pattern) {
            fancy_regex::Regex::new(pattern)
                .map(Self::Backtracking)
                .map_err(|e| e.to_string())
        } else {
            regex::Regex::new(pattern)
                .map(Self::Linear)
                .map_err(|e| e.to_string())
        };
        compiled.map_err(|message| GuardError::InvalidPattern {
            pattern: pattern.to_string(),
            message,
        })
    }

    /// Backtracking execution errors (e.g. the backtrack limit) count as no match.
    pub fn is_match(&self, text: &str) -> bool {
        match self {
            Self::Linear(re) => re.is_match(text),
            Self::Backtracking(re) => re.is_match(text).unwrap_or(false),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Linear(re) => re.as_str(),
            Self::Backtracking(re) => re.as_str(),
        }
    }
}

/// Whether a pattern uses syntax the `regex` crate rejects.
fn needs_backtracking_engine(pattern: &str) -> bool {
    ["(?=", "(?!", "(?<=", "(?<!", "(?>"]
        .iter()
        .any(|s| pattern.contains(s))
        || pattern
            .as_bytes()
            .windows(2)
            .any(|w| w[0] == b'\\' && w[1].is_ascii_digit() && w[1] != b'0')
}

/// A predicate callable by name from configuration.
pub type PredicateFn = fn(&str) -> bool;

/// Look up a built-in predicate.
pub fn predicate_by_name(name: &str) -> Option<PredicateFn> {
    match name {
        "destructive_clean" => Some(is_destructive_clean),
        _ => None,
    }
}

static CLEAN: LazyLock<Regex> = LazyLock::new(|| compile_static(r"(?i)git\s+clean\b"));
static DRY_RUN_SHORT: LazyLock<Regex> = LazyLock::new(|| compile_static(r"(?i)(?:^|\s)-\w*n"));
static DRY_RUN_LONG: LazyLock<Regex> = LazyLock::new(|| compile_static(r"(?i)--dry-run"));
static FORCE_LONG: LazyLock<Regex> =
    LazyLock::new(|| compile_static(r"(?i)(?:^|\s)--force\b"));
static FORCE_SHORT: LazyLock<Regex> = LazyLock::new(|| compile_static(r"(?i)(?:^|\s)-[a-z]*f"));
static DIR_SHORT: LazyLock<Regex> = LazyLock::new(|| compile_static(r"(?i)(?:^|\s)-[a-z]*d"));

fn compile_static(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in pattern must compile")
}

/// `git clean` that removes untracked directories for real.
///
/// True iff the command runs clean with a force flag (`-f` in any short
/// cluster or `--force`) and a directory flag (`-d` in any short cluster),
/// and carries no dry-run flag (`-n` in any short cluster or `--dry-run`).
pub fn is_destructive_clean(cmd: &str) -> bool {
    if !CLEAN.is_match(cmd) {
        return false;
    }
    if DRY_RUN_SHORT.is_match(cmd) || DRY_RUN_LONG.is_match(cmd) {
        return false;
    }
    let has_force = FORCE_LONG.is_match(cmd) || FORCE_SHORT.is_match(cmd);
    let has_dir = DIR_SHORT.is_match(cmd);
    has_force && has_dir
}

/// Either kind of rule matcher behind one `matches` call.
#[derive(Clone)]
pub enum Matcher {
    Regex(CompiledRegex),
    Predicate { name: String, func: PredicateFn },
}

impl Matcher {
    pub fn regex(pattern: &str) -> Result<Self> {
        CompiledRegex::new(pattern).map(Self::Regex)
    }

    pub fn predicate(name: &str) -> Result<Self> {
        let func =
            predicate_by_name(name).ok_or_else(|| GuardError::UnknownPredicate(name.into()))?;
        Ok(Self::Predicate {
            name: name.to_string(),
            func,
        })
    }

    pub fn matches(&self, text: &str) -> bool {
        match self {
            Self::Regex(re) => re.is_match(text),
            Self::Predicate { func, .. } => func(text),
        }
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regex(re) => write!(f, "Regex({:?})", re.as_str()),
            Self::Predicate { name, .. } => write!(f, "Predicate({name})"),
        }
    }
}

/// A matcher paired with the message shown when it fires.
#[derive(Debug, Clone)]
pub struct Rule {
    pub matcher: Matcher,
    pub message: String,
}

impl Rule {
    pub fn new(matcher: Matcher, message: impl Into<String>) -> Self {
        Self {
            matcher,
            message: message.into(),
        }
    }

    pub fn from_config(config: &RuleConfig) -> Result<Self> {
        let matcher = match (&config.pattern, &config.predicate) {
            (Some(pattern), None) => Matcher::regex(pattern)?,
            (None, Some(name)) => Matcher::predicate(name)?,
            (Some(_), Some(_)) => {
                return Err(GuardError::InvalidRule(
                    "set either `pattern` or `predicate`, not both".into(),
                ));
            }
            (None, None) => {
                return Err(GuardError::InvalidRule(
                    "rule needs a `pattern` or a `predicate`".into(),
                ));
            }
        };
        Ok(Self::new(matcher, config.message.clone()))
    }

    pub fn matches(&self, text: &str) -> bool {
        self.matcher.matches(text)
    }
}

/// Compile a list of `(pattern, message)` constants, dropping any that fail.
pub fn compile_builtin(rules: &[(&str, &str)]) -> Vec<Rule> {
    rules
        .iter()
        .filter_map(|(pattern, message)| {
            Matcher::regex(pattern).ok().map(|m| Rule::new(m, *message))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookaround_selects_backtracking() {
        let re = CompiledRegex::new(r"git\s+push(?=.*--force)").unwrap();
        assert!(matches!(re, CompiledRegex::Backtracking(_)));
        let re = CompiledRegex::new(r"git\s+push").unwrap();
        assert!(matches!(re, CompiledRegex::Linear(_)));
    }

    #[test]
    fn invalid_pattern_is_error() {
        let err = CompiledRegex::new("(unclosed").unwrap_err();
        assert!(matches!(err, GuardError::InvalidPattern { .. }));
    }

    #[test]
    fn regex_matcher() {
        let m = Matcher::regex(r"(?i)git\s+reset\s+--hard").unwrap();
        assert!(m.matches("git reset --hard HEAD~1"));
        assert!(m.matches("GIT RESET --HARD"));
        assert!(!m.matches("git reset --soft HEAD~1"));
    }

    #[test]
    fn predicate_matcher() {
        let m = Matcher::predicate("destructive_clean").unwrap();
        assert!(m.matches("git clean -fd"));
        assert!(!m.matches("git clean -fdn"));
        assert_eq!(format!("{m:?}"), "Predicate(destructive_clean)");
    }

    #[test]
    fn unknown_predicate() {
        assert!(matches!(
            Matcher::predicate("nope"),
            Err(GuardError::UnknownPredicate(_))
        ));
    }

    #[test]
    fn rule_from_config_needs_exactly_one_matcher() {
        let neither = RuleConfig::default();
        assert!(matches!(Rule::from_config(&neither), Err(GuardError::InvalidRule(_))));

        let both = RuleConfig {
            pattern: Some("x".into()),
            predicate: Some("destructive_clean".into()),
            message: String::new(),
        };
        assert!(matches!(Rule::from_config(&both), Err(GuardError::InvalidRule(_))));

        let ok = RuleConfig {
            pattern: Some("x".into()),
            predicate: None,
            message: "m".into(),
        };
        assert_eq!(Rule::from_config(&ok).unwrap().message, "m");
    }

    // ── destructive clean ──

    #[test]
    fn clean_destructive_variants() {
        for cmd in [
            "git clean -fd",
            "git clean -df",
            "git clean --force -d",
            "git clean -f -d",
            "git clean -fdx",
            "git clean -fde .gitignore",
        ] {
            assert!(is_destructive_clean(cmd), "{cmd}");
        }
    }

    #[test]
    fn clean_safe_variants() {
        for cmd in [
            "git clean -fdn",
            "git clean --dry-run -fd",
            "git clean -n",
            "git clean",
            "git clean -f",
            "git clean -d",
            "git status",
        ] {
            assert!(!is_destructive_clean(cmd), "{cmd}");
        }
    }

    #[test]
    fn compile_builtin_skips_bad_patterns() {
        let rules = compile_builtin(&[("ok", "fine"), ("(bad", "broken")]);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].message, "fine");
    }
}
