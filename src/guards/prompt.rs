use crate::config::PromptConfig;
use crate::error::Result;
use crate::eval::matcher::CompiledRegex;
use crate::eval::{Context, Verdict};
use crate::guards::Guard;
use crate::hook::ToolEvent;

const COMPLEXITY_PATTERNS: &[&str] = &[
    r"(?i)\b(implement|create|build|add|write)\b.{0,30}\b(feature|function|endpoint|api|service|handler)",
    r"(?i)\bnew\s+(feature|functionality)",
    r"(?i)\bwrite\s+(a\s+)?(function|class|method|code|script)",
    r"(?i)\bcreate\s+(a\s+)?(endpoint|api|handler|service)",
];

const SKILL_INDICATORS: &[&str] = &[
    "/spark",
    "/autopilot",
    "/audit",
    "/plan",
    "/council",
    r"\bspark\b",
    r"\bautopilot\b",
    r"\baudit\b",
];

const GUIDANCE: &str = "Complex task detected!\n\nConsider using /spark for proper planning.";

fn compile_all<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<CompiledRegex>> {
    patterns.iter().map(|p| CompiledRegex::new(p.as_ref())).collect()
}

fn compile_builtin(patterns: &[&str]) -> Vec<CompiledRegex> {
    patterns.iter().filter_map(|p| CompiledRegex::new(p).ok()).collect()
}

/// Flags prompts that look like unplanned feature work.
#[derive(Debug, Clone)]
pub struct PromptGuard {
    complexity: Vec<CompiledRegex>,
    skill_indicators: Vec<CompiledRegex>,
    guidance: String,
}

impl Default for PromptGuard {
    fn default() -> Self {
        Self {
            complexity: compile_builtin(COMPLEXITY_PATTERNS),
            skill_indicators: compile_builtin(SKILL_INDICATORS),
            guidance: GUIDANCE.to_string(),
        }
    }
}

impl PromptGuard {
    pub fn from_config(config: &PromptConfig) -> Result<Self> {
        Ok(Self {
            complexity: match &config.complexity_patterns {
                Some(p) => compile_all(p)?,
                None => compile_builtin(COMPLEXITY_PATTERNS),
            },
            skill_indicators: match &config.skill_indicators {
                Some(p) => compile_all(p)?,
                None => compile_builtin(SKILL_INDICATORS),
            },
            guidance: config.guidance.clone().unwrap_or_else(|| GUIDANCE.to_string()),
        })
    }

    /// Skill indicators approve outright; otherwise complexity blocks.
    pub fn check(&self, prompt: &str) -> Verdict {
        let prompt = prompt.to_lowercase();
        if self.skill_indicators.iter().any(|re| re.is_match(&prompt)) {
            return Verdict::approve();
        }
        if self.complexity.iter().any(|re| re.is_match(&prompt)) {
            return Verdict::block(self.guidance.clone());
        }
        Verdict::approve()
    }
}

impl Guard for PromptGuard {
    fn evaluate(&self, event: &ToolEvent, _ctx: &Context) -> Result<Verdict> {
        Ok(self.check(&event.prompt))
    }
}
