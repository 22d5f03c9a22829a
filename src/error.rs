use std::path::PathBuf;

use thiserror::Error;

/// Errors raised inside the guard library.
///
/// None of these ever reach the hook host: the guard boundary in
/// [`crate::guards::run`] logs them and falls back to the most permissive
/// decision for the event kind.
#[derive(Error, Debug)]
pub enum GuardError {
    /// Filesystem or pipe failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON in a state file or hook payload.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A configuration file failed to parse.
    #[error("config parse error in {origin}: {source}")]
    ConfigParse {
        /// Where the TOML came from (embedded defaults or a file path).
        origin: String,
        #[source]
        source: toml::de::Error,
    },

    /// A rule or prompt pattern failed to compile.
    #[error("invalid pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },

    /// A rule table set neither or both of `pattern` and `predicate`.
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    /// A rule referenced a predicate that does not exist.
    #[error("unknown predicate `{0}`")]
    UnknownPredicate(String),

    /// An explicitly referenced spec document could not be read.
    #[error("cannot read spec {}: {source}", path.display())]
    SpecUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A child process could not be run or exited unsuccessfully.
    #[error("{program}: {message}")]
    Process { program: String, message: String },

    /// A child process outlived its deadline and was killed.
    #[error("{program} timed out after {millis}ms")]
    Timeout { program: String, millis: u64 },
}

pub type Result<T, E = GuardError> = std::result::Result<T, E>;
