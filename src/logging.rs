use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use log::{LevelFilter, debug};
use simplelog::{CombinedLogger, SharedLogger, WriteLogger};

/// Env var that turns on debug logging when set to `1`.
pub const DEBUG_ENV: &str = "CC_GUARDRAIL_DEBUG";
/// Env var naming an extra file that receives debug records.
pub const LOG_FILE_ENV: &str = "CC_GUARDRAIL_LOG_FILE";

/// Path of the append-only error log: ~/.cache/cc-guardrail/hook-errors.log.
pub fn error_log_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(
        std::path::Path::new(&home)
            .join(".cache/cc-guardrail")
            .join("hook-errors.log"),
    )
}

/// Append an error record for `hook`.
/// Best-effort: failures are silently ignored (logging must never block the hook).
pub fn log_hook_error(hook: &str, error: &dyn std::fmt::Display) {
    log::error!("[{hook}] {error}");

    let Some(log_path) = error_log_path() else {
        return;
    };
    if let Some(dir) = log_path.parent() {
        let _ = std::fs::create_dir_all(dir);
    }
    let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
    else {
        return;
    };

    let message = error.to_string().replace('\n', "; ");
    let _ = writeln!(file, "{} [{hook}]: {message}", timestamp_now());
}

/// Whether debug logging was requested through the environment.
pub fn debug_enabled() -> bool {
    std::env::var(DEBUG_ENV).is_ok_and(|v| v == "1")
}

/// Install the debug logger if `CC_GUARDRAIL_DEBUG=1`.
///
/// Records go to stderr and, when `CC_GUARDRAIL_LOG_FILE` is set, are also
/// appended to that file. Stdout is reserved for the hook protocol.
pub fn init_debug_logging() {
    if !debug_enabled() {
        return;
    }

    let config = simplelog::Config::default();
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![WriteLogger::new(
        LevelFilter::Debug,
        config.clone(),
        std::io::stderr(),
    )];

    if let Some(path) = std::env::var_os(LOG_FILE_ENV) {
        let path = PathBuf::from(path);
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        if let Ok(file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
        {
            loggers.push(WriteLogger::new(LevelFilter::Debug, config, file));
        }
    }

    // A second init (tests, embedding) keeps the first logger.
    let _ = CombinedLogger::init(loggers);
}

/// Measures one guard invocation; logs the elapsed time on [`HookTimer::end`].
#[derive(Debug)]
pub struct HookTimer {
    hook: &'static str,
    start: Instant,
}

impl HookTimer {
    pub fn start(hook: &'static str) -> Self {
        Self {
            hook,
            start: Instant::now(),
        }
    }

    pub fn end(self, decision: &str) {
        let ms = self.start.elapsed().as_secs_f64() * 1000.0;
        debug!("[{}] complete decision={decision} ms={ms:.2}", self.hook);
    }
}

/// Simple UTC timestamp without external deps.
fn timestamp_now() -> String {
    let dur = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = dur.as_secs();
    let (year, month, day) = epoch_days_to_date(secs / 86400);
    let rem = secs % 86400;
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}Z",
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60
    )
}

/// Convert days since Unix epoch to (year, month, day).
fn epoch_days_to_date(days: u64) -> (u64, u64, u64) {
    // Civil calendar from days algorithm (Howard Hinnant)
    let z = days + 719468;
    let era = z / 146097;
    let doe = z - era * 146097;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    (y, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_start() {
        assert_eq!(epoch_days_to_date(0), (1970, 1, 1));
    }

    #[test]
    fn leap_day() {
        // 2024-02-29 is day 19782 since the epoch
        assert_eq!(epoch_days_to_date(19782), (2024, 2, 29));
    }

    #[test]
    fn timestamp_shape() {
        let ts = timestamp_now();
        assert_eq!(ts.len(), 20);
        assert!(ts.ends_with('Z'));
        assert_eq!(&ts[10..11], "T");
    }

    #[test]
    fn timer_end_does_not_panic() {
        HookTimer::start("test").end("allow");
    }
}
