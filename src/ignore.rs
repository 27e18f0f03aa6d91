//! Ignore-pattern matching
//!
//! Glob-style patterns (`*`, `?`, `**`, backslash escaping) decide
//! which paths the scheduler will never turn into backup requests. The
//! matcher is a pure function from (path, pattern set) to bool and is
//! injected into the scheduler as a capability, so it can be replaced
//! in tests and re-evaluated at fire time rather than notify time.

use crate::error::{Result, VigilError};
use crate::types::WatchedRoot;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use std::sync::Arc;

/// Capability interface consumed by the scheduler
pub trait IgnoreFilter: Send + Sync {
    /// Whether the path must be excluded from backups
    fn is_ignored(&self, path: &Path) -> bool;
}

/// A compiled set of glob patterns
#[derive(Debug, Clone)]
pub struct IgnoreSet {
    set: GlobSet,
}

impl IgnoreSet {
    /// Compile a pattern list
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern.as_ref())
                .map_err(|e| VigilError::InvalidPattern(e.to_string()))?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| VigilError::InvalidPattern(e.to_string()))?;
        Ok(IgnoreSet { set })
    }

    /// Pure match against the compiled patterns
    pub fn matches(&self, path: &Path) -> bool {
        self.set.is_match(path)
    }
}

/// Filter combining the global pattern list with per-root patterns
///
/// A path is checked against the pattern set of the watched root that
/// contains it (global patterns plus that root's extras). Paths outside
/// every watched root are ignored outright: the daemon has no business
/// backing them up even if a stray event mentions them.
pub struct RootedIgnoreFilter {
    roots: Vec<(WatchedRoot, IgnoreSet)>,
}

impl RootedIgnoreFilter {
    /// Compile one filter for a set of watched roots and global patterns
    pub fn compile(roots: &[WatchedRoot], global_patterns: &[String]) -> Result<Arc<Self>> {
        let mut compiled = Vec::with_capacity(roots.len());
        for root in roots {
            let mut patterns: Vec<String> = global_patterns.to_vec();
            patterns.extend(root.ignore_patterns.iter().cloned());
            compiled.push((root.clone(), IgnoreSet::compile(&patterns)?));
        }
        Ok(Arc::new(RootedIgnoreFilter { roots: compiled }))
    }
}

impl IgnoreFilter for RootedIgnoreFilter {
    fn is_ignored(&self, path: &Path) -> bool {
        for (root, set) in &self.roots {
            if let Ok(relative) = path.strip_prefix(&root.path) {
                // Match both the relative and the absolute form so
                // patterns like "*.tmp" and "/abs/dir/**" both work.
                return set.matches(relative) || set.matches(path);
            }
        }
        true
    }
}
