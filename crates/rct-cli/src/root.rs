use rct_core::paths;
use std::path::{Path, PathBuf};

/// Resolve the project root directory.
///
/// Priority:
/// 1. `--root` flag / `RCT_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `.env` or `config/launchd/`
/// 3. Walk upward from `cwd` looking for `.git/`
/// 4. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_upward(&cwd, is_project_root)
        .or_else(|| find_upward(&cwd, |d| d.join(".git").is_dir()))
        .unwrap_or(cwd)
}

fn is_project_root(dir: &Path) -> bool {
    paths::env_path(dir).is_file() || paths::launchd_dir(dir).is_dir()
}

fn find_upward(start: &Path, pred: impl Fn(&Path) -> bool) -> Option<PathBuf> {
    start.ancestors().find(|d| pred(d)).map(Path::to_path_buf)
}
