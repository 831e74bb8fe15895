use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;

/// Immediate subdirectories of `root`, sorted by name. A missing root has none.
pub fn list_subdirectories(root: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(PipelineError::Filesystem(format!(
                "read dir {}: {err}",
                root.display()
            )));
        }
    };
    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Best-effort removal; failures are logged and swallowed.
pub fn delete_file(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!("deleted {}", path.display());
            true
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("{} does not exist", path.display());
            false
        }
        Err(err) => {
            tracing::warn!("failed to delete {}: {err}", path.display());
            false
        }
    }
}

pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.is_file() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.is_file() {
            return Some(plain);
        }
    }
    None
}
