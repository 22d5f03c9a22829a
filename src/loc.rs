//! File size limits: line counting and test-file classification.

use std::path::Path;
use std::sync::LazyLock;

use regex::RegexSet;

use crate::error::{GuardError, Result};
use crate::eval::Verdict;

pub const MAX_LINES_CODE: usize = 400;
pub const MAX_LINES_TEST: usize = 600;
pub const WARN_FRACTION: f64 = 0.875;

/// Any match marks a path as a test file.
const TEST_FILE_PATTERNS: &[&str] = &[
    r"_test\.",
    r"\.test\.",
    r"\.spec\.",
    r"(^|/)tests?/",
    r"(^|/)__tests__/",
    r"(^|/)test_[^/]+\.py$",
];

static TEST_FILE: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new(TEST_FILE_PATTERNS).expect("built-in pattern must compile")
});

/// Number of lines in `path`; missing or unreadable files count as zero.
///
/// A trailing newline does not start a new line, so `"a\nb"` and
/// `"a\nb\n"` both count as two.
pub fn count_lines(path: &Path) -> usize {
    std::fs::read(path)
        .map(|bytes| count_lines_in(&String::from_utf8_lossy(&bytes)))
        .unwrap_or(0)
}

pub fn count_lines_in(content: &str) -> usize {
    if content.is_empty() {
        return 0;
    }
    let lines = content.split('\n').count();
    if content.ends_with('\n') { lines - 1 } else { lines }
}

pub fn is_test_file(path: &str) -> bool {
    TEST_FILE.is_match(&path.replace('\\', "/"))
}

/// Size ceiling and soft-warning threshold for one class of file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    pub max_lines_code: usize,
    pub max_lines_test: usize,
    pub warn_fraction: f64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_lines_code: MAX_LINES_CODE,
            max_lines_test: MAX_LINES_TEST,
            warn_fraction: WARN_FRACTION,
        }
    }
}

impl Limits {
    /// Limits from configured values; a zero ceiling or a warn fraction
    /// outside `(0, 1]` would turn every file into an ask.
    pub fn new(max_lines_code: usize, max_lines_test: usize, warn_fraction: f64) -> Result<Self> {
        if max_lines_code == 0 || max_lines_test == 0 {
            return Err(GuardError::InvalidRule(format!(
                "line limits must be positive (code {max_lines_code}, test {max_lines_test})"
            )));
        }
        if !(warn_fraction > 0.0 && warn_fraction <= 1.0) {
            return Err(GuardError::InvalidRule(format!(
                "warn_fraction must be in (0, 1], got {warn_fraction}"
            )));
        }
        Ok(Self {
            max_lines_code,
            max_lines_test,
            warn_fraction,
        })
    }

    pub fn max_for(&self, rel_path: &str) -> usize {
        if is_test_file(rel_path) {
            self.max_lines_test
        } else {
            self.max_lines_code
        }
    }

    /// Line count from which a warning is raised: `floor(max * warn_fraction)`.
    pub fn warn_at(&self, max: usize) -> usize {
        (max as f64 * self.warn_fraction).floor() as usize
    }

    /// Ask when `loc` reaches the warning line or the ceiling; `None` otherwise.
    pub fn check(&self, rel_path: &str, loc: usize) -> Option<Verdict> {
        let max = self.max_for(rel_path);
        if loc >= max {
            return Some(Verdict::ask(format!(
                "File exceeds LOC limit!\n\n{rel_path}: {loc} lines (limit: {max})\n\n\
                 Consider splitting the file.\nSee: CLAUDE.md -> File Limits\n\nProceed anyway?"
            )));
        }
        if loc >= self.warn_at(max) {
            return Some(Verdict::ask(format!(
                "File approaching LOC limit\n\n{rel_path}: {loc} lines (limit: {max})\n\nProceed?"
            )));
        }
        None
    }
}
