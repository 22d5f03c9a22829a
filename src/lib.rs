//! cc-guardrail: fail-open policy hooks for Claude Code.
//!
//! Each hook invocation hands one event (a shell command, a file write, a
//! user prompt, a session stop) to the matching guard, which answers with
//! a [`eval::Verdict`]. Rules come from embedded TOML defaults with an
//! optional project overlay. Any failure inside a guard degrades to the
//! most permissive verdict for the event kind; the hook never wedges the
//! agent.
//!
//! # Architecture
//!
//! - **[`hook`]**: Event protocol: stdin JSON → [`hook::ToolEvent`],
//!   verdict → kind-specific output.
//! - **[`guards`]**: Command, file-edit, prompt, post-edit and session-stop
//!   guards behind the fail-open boundary.
//! - **[`eval`]**: Decisions, matchers, the compiled [`eval::RuleSet`] and the
//!   per-process [`eval::Context`].
//! - **[`config`]**: Configuration loading: embedded defaults + project overlay merge.
//! - **[`allowlist`]**: Spec "Allowed Files" parsing, glob matching, spec discovery.
//! - **[`loc`]**: Line counting and test-file classification.
//! - **[`logging`]**: Error log at `~/.cache/cc-guardrail/hook-errors.log` and
//!   opt-in debug logging.

/// Spec allowlist parsing, glob matching and spec discovery.
pub mod allowlist;
/// Configuration types, loading, and overlay merge logic.
pub mod config;
/// Library error type.
pub mod error;
/// Decisions, rule matchers, compiled rules and evaluation context.
pub mod eval;
/// Per-event guards and the fail-open dispatch boundary.
pub mod guards;
/// Hook protocol input parsing and output rendering.
pub mod hook;
/// File size limits.
pub mod loc;
/// Error and debug logging.
pub mod logging;
/// Child processes with a deadline.
pub mod process;
/// Project root and path normalization.
pub mod project;

use eval::Context;
use hook::{EventKind, ToolEvent};

/// Evaluate one raw event for `kind` and render the hook's output line.
///
/// `None` means the hook prints nothing. This is the main entry point for
/// tests and embedding; the binary builds its [`Context`] from the
/// environment.
pub fn handle(kind: EventKind, input: &str, ctx: &Context) -> Option<String> {
    let event = ToolEvent::parse(input);
    let verdict = guards::run(kind, &event, ctx);
    hook::render(kind, &verdict)
}

/// Evaluate a shell command against the embedded default rules.
pub fn evaluate(command: &str) -> eval::Verdict {
    eval::RuleSet::defaults().command.check(command)
}
