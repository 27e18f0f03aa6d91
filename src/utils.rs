//! Utility functions for vigil
//!
//! Small shared helpers: crash-safe file writing and path
//! normalization. Everything here is thread-safe and free of engine
//! state.

use crate::error::Result;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tracing::trace;

/// Atomic file write (write to a temporary file, then rename)
///
/// The temporary file is created in the target's directory so the
/// rename stays on one filesystem and is atomic. A crash mid-write
/// leaves either the prior file or the new complete file, never a mix;
/// a stray temporary is harmless because readers only ever open the
/// final path.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(content)?;
    temp.flush()?;
    temp.persist(path).map_err(|e| e.error)?;
    trace!("Atomically wrote {} bytes to {:?}", content.len(), path);
    Ok(())
}

/// Make a path absolute and lexically normalized
///
/// Relative paths are resolved against the current directory. `.` and
/// `..` components are folded without touching the filesystem, so the
/// function also works for paths that no longer exist (deletion
/// events). Symbolic links are not resolved.
pub fn normalize_path(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}

/// Whether `path` is lexically inside `dir`
pub fn is_in_dir(path: &Path, dir: &Path) -> bool {
    path.strip_prefix(dir).is_ok()
}

/// Create a directory and its parents if absent
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
        trace!("Created directory {:?}", path);
    }
    Ok(())
}
