/// Outcome vocabulary shared by every event kind.
///
/// Which outcomes a given kind may emit, and how they are written to the
/// wire, is decided by [`crate::hook::render`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Ask,
    Deny,
    Approve,
    Block,
    Continue,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Ask => "ask",
            Decision::Deny => "deny",
            Decision::Approve => "approve",
            Decision::Block => "block",
            Decision::Continue => "continue",
        }
    }
}

/// A guard's answer for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub decision: Decision,
    pub reason: Option<String>,
}

impl Verdict {
    pub fn allow() -> Self {
        Self::bare(Decision::Allow)
    }

    pub fn ask(reason: impl Into<String>) -> Self {
        Self::with_reason(Decision::Ask, reason)
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self::with_reason(Decision::Deny, reason)
    }

    pub fn approve() -> Self {
        Self::bare(Decision::Approve)
    }

    pub fn block(reason: impl Into<String>) -> Self {
        Self::with_reason(Decision::Block, reason)
    }

    pub fn continue_with(context: impl Into<String>) -> Self {
        Self::with_reason(Decision::Continue, context)
    }

    pub fn bare(decision: Decision) -> Self {
        Self {
            decision,
            reason: None,
        }
    }

    pub fn with_reason(decision: Decision, reason: impl Into<String>) -> Self {
        Self {
            decision,
            reason: Some(reason.into()),
        }
    }

    pub fn reason(&self) -> &str {
        self.reason.as_deref().unwrap_or("")
    }
}
