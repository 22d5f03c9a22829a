//! Hook protocol: one JSON event in on stdin, at most one JSON line out.
//!
//! Parsing never fails. Missing, mistyped or malformed fields read as
//! empty strings, and unparseable input reads as `{}`. Each event kind
//! has its own output shape; [`render`] returns `None` when the verdict
//! is expressed by staying silent.

use std::fmt;
use std::io::Read;

use serde::Serialize;
use serde_json::Value;

use crate::eval::{Decision, Verdict};

/// Which guard an event is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Command,
    FileEdit,
    Prompt,
    PostEdit,
    SessionStop,
}

/// Tools whose pre-use events go to the file-edit guard.
const EDIT_TOOLS: &[&str] = &["Write", "Edit", "MultiEdit", "NotebookEdit"];

impl EventKind {
    /// Map a CLI hook name (`pre-bash`, `pre-edit`, ...) to its kind.
    pub fn from_hook_name(name: &str) -> Option<Self> {
        match name {
            "pre-bash" => Some(Self::Command),
            "pre-edit" => Some(Self::FileEdit),
            "prompt-guard" => Some(Self::Prompt),
            "post-edit" => Some(Self::PostEdit),
            "session-end" => Some(Self::SessionStop),
            _ => None,
        }
    }

    pub fn hook_name(self) -> &'static str {
        match self {
            Self::Command => "pre-bash",
            Self::FileEdit => "pre-edit",
            Self::Prompt => "prompt-guard",
            Self::PostEdit => "post-edit",
            Self::SessionStop => "session-end",
        }
    }

    /// Infer the kind from the host's event and tool names.
    pub fn infer(hook_event_name: &str, tool_name: &str) -> Option<Self> {
        match hook_event_name {
            "PreToolUse" if tool_name == "Bash" => Some(Self::Command),
            "PreToolUse" if EDIT_TOOLS.contains(&tool_name) => Some(Self::FileEdit),
            "PostToolUse" => Some(Self::PostEdit),
            "UserPromptSubmit" => Some(Self::Prompt),
            "Stop" | "SubagentStop" | "SessionEnd" => Some(Self::SessionStop),
            _ => None,
        }
    }

    /// The verdict used when a guard fails: nothing is ever blocked.
    pub fn permissive(self) -> Verdict {
        match self {
            Self::Command | Self::FileEdit => Verdict::allow(),
            Self::Prompt | Self::SessionStop => Verdict::approve(),
            Self::PostEdit => Verdict::bare(Decision::Continue),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.hook_name())
    }
}

/// Everything a guard needs from one host event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolEvent {
    pub hook_event_name: String,
    pub tool_name: String,
    pub command: String,
    pub file_path: String,
    pub prompt: String,
    pub stop_reason: String,
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("")
}

impl ToolEvent {
    /// Parse a raw event. Never fails.
    pub fn parse(input: &str) -> Self {
        let value: Value =
            serde_json::from_str(input).unwrap_or_else(|_| Value::Object(Default::default()));
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Self {
        let tool_input = value.get("tool_input").unwrap_or(&Value::Null);
        let prompt = match str_field(value, "user_prompt") {
            "" => str_field(value, "prompt"),
            p => p,
        };
        Self {
            hook_event_name: str_field(value, "hook_event_name").to_string(),
            tool_name: str_field(value, "tool_name").to_string(),
            command: str_field(tool_input, "command").to_string(),
            file_path: str_field(tool_input, "file_path").to_string(),
            prompt: prompt.to_string(),
            stop_reason: str_field(value, "stop_reason").to_string(),
        }
    }

    pub fn inferred_kind(&self) -> Option<EventKind> {
        EventKind::infer(&self.hook_event_name, &self.tool_name)
    }
}

/// Read all of `reader` and parse it. Read failures yield an empty event.
pub fn read_event(mut reader: impl Read) -> ToolEvent {
    let mut input = String::new();
    if reader.read_to_string(&mut input).is_err() {
        return ToolEvent::default();
    }
    ToolEvent::parse(&input)
}

// ── Output shapes ──

#[derive(Debug, Serialize)]
struct PermissionOutput<'a> {
    #[serde(rename = "hookSpecificOutput")]
    hook_specific_output: PermissionDecision<'a>,
}

#[derive(Debug, Serialize)]
struct PermissionDecision<'a> {
    #[serde(rename = "permissionDecision")]
    permission_decision: &'static str,
    #[serde(rename = "permissionDecisionReason")]
    permission_decision_reason: &'a str,
}

#[derive(Debug, Serialize)]
struct PromptOutput<'a> {
    decision: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ContinueOutput<'a> {
    decision: &'static str,
    #[serde(rename = "hookSpecificOutput")]
    hook_specific_output: AdditionalContext<'a>,
}

#[derive(Debug, Serialize)]
struct AdditionalContext<'a> {
    #[serde(rename = "additionalContext")]
    additional_context: &'a str,
}

#[derive(Debug, Serialize)]
struct SystemMessageOutput<'a> {
    decision: &'static str,
    #[serde(rename = "systemMessage")]
    system_message: &'a str,
}

fn to_line<T: Serialize>(value: &T) -> Option<String> {
    serde_json::to_string(value).ok()
}

/// Serialize a verdict in the shape the host expects for `kind`.
///
/// `None` means "print nothing". Decisions a kind cannot express are
/// downgraded: a session-stop event can never block, and a prompt
/// event always answers.
pub fn render(kind: EventKind, verdict: &Verdict) -> Option<String> {
    match kind {
        EventKind::Command | EventKind::FileEdit => match verdict.decision {
            Decision::Deny | Decision::Ask => to_line(&PermissionOutput {
                hook_specific_output: PermissionDecision {
                    permission_decision: verdict.decision.as_str(),
                    permission_decision_reason: verdict.reason(),
                },
            }),
            _ => None,
        },
        EventKind::Prompt => match verdict.decision {
            Decision::Block => to_line(&PromptOutput {
                decision: Decision::Block.as_str(),
                reason: Some(verdict.reason()),
            }),
            _ => to_line(&PromptOutput {
                decision: Decision::Approve.as_str(),
                reason: None,
            }),
        },
        EventKind::PostEdit => match verdict.reason.as_deref() {
            Some(context) if !context.is_empty() => to_line(&ContinueOutput {
                decision: Decision::Continue.as_str(),
                hook_specific_output: AdditionalContext {
                    additional_context: context,
                },
            }),
            _ => None,
        },
        EventKind::SessionStop => match verdict.reason.as_deref() {
            Some(message) if !message.is_empty() => to_line(&SystemMessageOutput {
                decision: Decision::Approve.as_str(),
                system_message: message,
            }),
            _ => None,
        },
    }
}
