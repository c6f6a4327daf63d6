//! Root data directory resolution and path normalization.

use std::env;
use std::path::{Component, Path, PathBuf};

/// Packaged installs that run from here keep their data here as well.
pub const PACKAGED_ROOT_DIR: &str = "/var/lib/orbit";

/// Resolve the agent root directory.
///
/// Precedence: explicit flag, then configured/env value, then the packaged
/// location when the running executable lives under [`PACKAGED_ROOT_DIR`],
/// then the platform default.
pub fn resolve_root_dir(
    explicit: Option<&Path>,
    configured: Option<&Path>,
    current_exe: Option<&Path>,
    platform_default: &Path,
) -> PathBuf {
    if let Some(dir) = explicit.or(configured) {
        return resolve_absolute_path(dir);
    }
    if let Some(exe) = current_exe
        && exe.starts_with(PACKAGED_ROOT_DIR)
    {
        return PathBuf::from(PACKAGED_ROOT_DIR);
    }
    platform_default.to_path_buf()
}

/// Resolve a path to an absolute, normalized path.
///
/// If `fs::canonicalize` succeeds (path exists), it is used to resolve symlinks
/// and normalize components.
///
/// If it fails (e.g. path does not exist), the path is made absolute relative
/// to CWD and `..`/`.` components are resolved syntactically.
pub fn resolve_absolute_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };

    if let Ok(canonical) = std::fs::canonicalize(&absolute) {
        return canonical;
    }

    normalize_syntactic(&absolute)
}

fn normalize_syntactic(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                }
            }
        }
    }
    components.into_iter().collect()
}
