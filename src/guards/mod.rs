//! Per-event guards and the fail-open boundary around them.
//!
//! Each guard is compiled from its configuration section once per process
//! and evaluated against a single [`ToolEvent`]. [`run`] is the only entry
//! point: whatever a guard does wrong (an error, a panic), the caller
//! gets the most permissive verdict for the event kind.

/// Block/ask rules over shell commands.
pub mod command;
/// Allowlist, protected paths, plan gate, size and sync-zone checks.
pub mod edit;
/// Formatter and linter feedback after a write.
pub mod post_edit;
/// Complexity heuristics over user prompts.
pub mod prompt;
/// End-of-session reminders.
pub mod session;

use std::panic::{AssertUnwindSafe, catch_unwind};

use log::debug;

use crate::error::Result;
use crate::eval::{Context, Verdict};
use crate::hook::{EventKind, ToolEvent};
use crate::logging::{HookTimer, log_hook_error};

/// A policy check for one kind of event.
pub trait Guard: Send + Sync {
    /// Decide on `event`. Errors are turned into a permissive verdict by [`run`].
    fn evaluate(&self, event: &ToolEvent, ctx: &Context) -> Result<Verdict>;
}

fn guard_for(kind: EventKind, ctx: &Context) -> &dyn Guard {
    let rules = &ctx.rules;
    match kind {
        EventKind::Command => &rules.command,
        EventKind::FileEdit => &rules.edit,
        EventKind::Prompt => &rules.prompt,
        EventKind::PostEdit => &rules.post_edit,
        EventKind::SessionStop => &rules.session,
    }
}

/// Evaluate `event` with the guard for `kind`. Never fails and never panics.
pub fn run(kind: EventKind, event: &ToolEvent, ctx: &Context) -> Verdict {
    let hook = kind.hook_name();
    let timer = HookTimer::start(hook);
    debug!("[{hook}] input tool={:?} file={:?}", event.tool_name, event.file_path);

    let outcome = catch_unwind(AssertUnwindSafe(|| guard_for(kind, ctx).evaluate(event, ctx)));
    let verdict = match outcome {
        Ok(Ok(verdict)) => verdict,
        Ok(Err(e)) => {
            log_hook_error(hook, &e);
            kind.permissive()
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "guard panicked".to_string());
            log_hook_error(hook, &message);
            kind.permissive()
        }
    };

    debug!(
        "[{hook}] decision={} reason={:?}",
        verdict.decision.as_str(),
        verdict.reason()
    );
    timer.end(verdict.decision.as_str());
    verdict
}
