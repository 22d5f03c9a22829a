//! Project root resolution and project-relative path handling.

use std::path::{Component, Path, PathBuf};

/// Env var the host sets to the project root.
pub const PROJECT_DIR_ENV: &str = "CLAUDE_PROJECT_DIR";

/// Resolve the project root.
///
/// `CLAUDE_PROJECT_DIR` is honored only when it resolves under the user's
/// home directory or the system temp directory; anything else (unset,
/// `/etc`, another user's home) falls back to the working directory.
pub fn project_dir() -> PathBuf {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let Some(raw) = std::env::var_os(PROJECT_DIR_ENV) else {
        return cwd;
    };
    let home = std::env::var_os("HOME").map(PathBuf::from);
    resolve_project_dir(Path::new(&raw), &cwd, home.as_deref(), &safe_roots())
        .unwrap_or(cwd)
}

/// Roots under which an override may point, besides `$HOME`.
fn safe_roots() -> Vec<PathBuf> {
    let mut roots = vec![lexical_normalize(&std::env::temp_dir())];
    if cfg!(unix) {
        roots.push(PathBuf::from("/tmp"));
    }
    roots
}

/// Sandbox check behind [`project_dir`], with its inputs made explicit.
pub fn resolve_project_dir(
    requested: &Path,
    cwd: &Path,
    home: Option<&Path>,
    extra_roots: &[PathBuf],
) -> Option<PathBuf> {
    if requested.as_os_str().is_empty() {
        return None;
    }
    let resolved = lexical_normalize(&cwd.join(requested));
    let under_home = home
        .filter(|h| !h.as_os_str().is_empty())
        .is_some_and(|h| resolved.starts_with(lexical_normalize(h)));
    let under_root = extra_roots.iter().any(|r| resolved.starts_with(r));
    (under_home || under_root).then_some(resolved)
}

/// Resolve `.` and `..` components without touching the filesystem.
pub fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Turn a tool-supplied path into a `/`-separated path relative to the
/// project root.
///
/// Relative paths are joined onto the root before `..` is resolved. Paths
/// that land outside the root come back absolute, so they never match
/// project-relative rules by accident.
pub fn relative_path(file_path: &str, project_dir: &Path) -> String {
    if file_path.is_empty() {
        return String::new();
    }
    let root = lexical_normalize(project_dir);
    let path = lexical_normalize(&root.join(file_path));
    let rel = match path.strip_prefix(&root) {
        Ok(rest) => rest.to_path_buf(),
        Err(_) => path,
    };
    rel.to_string_lossy().replace('\\', "/")
}

/// Absolute location of a tool-supplied path.
pub fn absolute_path(file_path: &str, project_dir: &Path) -> PathBuf {
    let path = Path::new(file_path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_dir.join(path)
    }
}
