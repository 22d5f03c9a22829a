//! cc-guardrail: policy hooks for Claude Code.
//!
//! Reads one hook event as JSON from stdin and writes at most one JSON
//! decision to stdout. Always exits 0 while handling an event: a failure
//! inside a guard degrades to the most permissive answer for that event.

use std::io::Write;

use cc_guardrail::eval::{Context, load_layered};
use cc_guardrail::hook::{EventKind, read_event, render};
use cc_guardrail::{guards, logging, project};

const USAGE: &str = "\
Usage: cc-guardrail [HOOK]
       cc-guardrail --dump-config

Hooks (event JSON on stdin):
  pre-bash       gate a shell command
  pre-edit       gate a file write
  prompt-guard   screen a user prompt
  post-edit      format and lint a written file
  session-end    end-of-session reminders

Without HOOK the kind is inferred from the event's hook_event_name.

Options:
  --dump-config  print the effective configuration as TOML
  -h, --help     print this help
  -V, --version  print the version";

fn main() {
    let arg = std::env::args().nth(1);
    match arg.as_deref() {
        Some("-h" | "--help") => {
            println!("{USAGE}");
            return;
        }
        Some("-V" | "--version") => {
            println!("cc-guardrail {}", env!("CARGO_PKG_VERSION"));
            return;
        }
        Some("--dump-config") => {
            let (config, _) = load_layered(&project::project_dir());
            print!("{}", config.to_toml());
            return;
        }
        _ => {}
    }

    logging::init_debug_logging();

    let event = read_event(std::io::stdin().lock());
    let kind = match arg.as_deref() {
        Some(name) => EventKind::from_hook_name(name),
        None => event.inferred_kind(),
    };
    let Some(kind) = kind else {
        log::debug!("no guard for hook {arg:?} / event {:?}", event.hook_event_name);
        return;
    };

    let ctx = Context::from_env();
    let verdict = guards::run(kind, &event, &ctx);
    if let Some(line) = render(kind, &verdict) {
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{line}");
        let _ = stdout.flush();
    }
}
