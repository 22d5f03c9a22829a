use std::path::Path;

use log::debug;

use crate::config::SessionConfig;
use crate::error::Result;
use crate::eval::{Context, Decision, Verdict};
use crate::guards::Guard;
use crate::hook::ToolEvent;

const DIARY_INDEX: &str = "ai/diary/index.md";
const PENDING_MARKER: &str = "| pending |";
const PENDING_THRESHOLD: usize = 5;

/// Reminds about unreflected diary entries when a session ends. Never blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionGuard {
    diary_index: String,
    pending_marker: String,
    pending_threshold: usize,
}

impl Default for SessionGuard {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

impl SessionGuard {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            diary_index: config.diary_index.clone().unwrap_or_else(|| DIARY_INDEX.into()),
            pending_marker: config
                .pending_marker
                .clone()
                .unwrap_or_else(|| PENDING_MARKER.into()),
            pending_threshold: config.pending_threshold.unwrap_or(PENDING_THRESHOLD),
        }
    }

    /// Pending entries in the project's diary index; zero when it is unreadable.
    pub fn pending_entries(&self, project_dir: &Path) -> usize {
        if self.pending_marker.is_empty() {
            return 0;
        }
        let path = project_dir.join(&self.diary_index);
        match std::fs::read_to_string(&path) {
            Ok(content) => content.matches(self.pending_marker.as_str()).count(),
            Err(e) => {
                debug!("[session-end] no diary index at {}: {e}", path.display());
                0
            }
        }
    }

    pub fn check(&self, project_dir: &Path) -> Verdict {
        let pending = self.pending_entries(project_dir);
        if pending > self.pending_threshold {
            return Verdict::with_reason(
                Decision::Approve,
                format!(
                    "Reminder: {pending} pending diary entries. Consider /reflect when convenient."
                ),
            );
        }
        Verdict::approve()
    }
}

impl Guard for SessionGuard {
    fn evaluate(&self, _event: &ToolEvent, ctx: &Context) -> Result<Verdict> {
        Ok(self.check(&ctx.project_dir))
    }
}
