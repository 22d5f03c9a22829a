use crate::config::{CommandConfig, RuleConfig};
use crate::error::Result;
use crate::eval::matcher::{Matcher, Rule, compile_builtin};
use crate::eval::{Context, Verdict};
use crate::guards::Guard;
use crate::hook::ToolEvent;

pub const ASK_OVERRIDE_TOKEN: &str = "--ff-only";

const PUSH_MAIN: &str = r"(?i)git\s+push\b.*(?<![a-zA-Z0-9_-])main(?![a-zA-Z0-9_-])";
const RESET_HARD: &str = r"(?i)git\s+reset\s+--hard";
const FORCE_PUSH_PROTECTED: &str =
    r"(?i)git\s+push\b(?=.*\b(develop|main)\b)(?=.*(-f\b|--force\b(?!-with-lease)))";
const BARE_MERGE: &str = r"(?i)git\s+merge\b(?![-a-z])";

/// Hard blocks used when `[[command.block]]` is not configured.
fn fallback_block() -> Vec<Rule> {
    let mut rules = compile_builtin(&[(PUSH_MAIN, "Push to main blocked!")]);
    if let Ok(clean) = Matcher::predicate("destructive_clean") {
        rules.push(Rule::new(clean, "git clean -fd blocked!"));
    }
    rules.extend(compile_builtin(&[
        (RESET_HARD, "git reset --hard blocked!"),
        (FORCE_PUSH_PROTECTED, "Force push to protected branch blocked!"),
    ]));
    rules
}

fn fallback_ask() -> Vec<Rule> {
    compile_builtin(&[(BARE_MERGE, "Use --ff-only for merges!")])
}

fn compile_rules(rules: &[RuleConfig]) -> Result<Vec<Rule>> {
    rules.iter().map(Rule::from_config).collect()
}

/// Ordered block and ask rules over the full command string.
#[derive(Debug, Clone)]
pub struct CommandGuard {
    block: Vec<Rule>,
    ask: Vec<Rule>,
    ask_override_token: String,
}

impl Default for CommandGuard {
    fn default() -> Self {
        Self {
            block: fallback_block(),
            ask: fallback_ask(),
            ask_override_token: ASK_OVERRIDE_TOKEN.to_string(),
        }
    }
}

impl CommandGuard {
    pub fn from_config(config: &CommandConfig) -> Result<Self> {
        Ok(Self {
            block: match &config.block {
                Some(rules) => compile_rules(rules)?,
                None => fallback_block(),
            },
            ask: match &config.ask {
                Some(rules) => compile_rules(rules)?,
                None => fallback_ask(),
            },
            ask_override_token: config
                .ask_override_token
                .clone()
                .unwrap_or_else(|| ASK_OVERRIDE_TOKEN.to_string()),
        })
    }

    /// Block rules first, then ask rules; the first match decides.
    pub fn check(&self, command: &str) -> Verdict {
        if command.is_empty() {
            return Verdict::allow();
        }
        if let Some(rule) = self.block.iter().find(|r| r.matches(command)) {
            return Verdict::deny(rule.message.clone());
        }
        if let Some(rule) = self.ask.iter().find(|r| r.matches(command)) {
            let overridden =
                !self.ask_override_token.is_empty() && command.contains(&self.ask_override_token);
            if !overridden {
                return Verdict::ask(rule.message.clone());
            }
        }
        Verdict::allow()
    }
}

impl Guard for CommandGuard {
    fn evaluate(&self, event: &ToolEvent, _ctx: &Context) -> Result<Verdict> {
        Ok(self.check(&event.command))
    }
}
