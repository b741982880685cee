//! Ephemeral scratch workspace and its cleaner.

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Counts of entries removed by one cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub files_removed: usize,
    pub dirs_removed: usize,
}

impl CleanupReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files_removed == 0 && self.dirs_removed == 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CleanupError {
    #[error("failed to list '{path}': {source}")]
    List {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to remove '{path}': {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Removes everything below a workspace root.
pub trait WorkspaceCleaner: Send + Sync {
    /// Delete every file and directory under `root`, keeping `root` itself.
    ///
    /// # Errors
    ///
    /// Returns [`CleanupError`] on the first entry that can't be listed or
    /// removed. Nothing is retried.
    fn clean(&self, root: &Path) -> Result<CleanupReport, CleanupError>;
}

/// Filesystem cleaner. A missing root counts as already clean.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsCleaner;

impl FsCleaner {
    fn clean_dir(dir: &Path, report: &mut CleanupReport) -> Result<(), CleanupError> {
        let entries = std::fs::read_dir(dir).map_err(|source| CleanupError::List {
            path: dir.to_path_buf(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| CleanupError::List {
                path: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(|source| CleanupError::List {
                path: path.clone(),
                source,
            })?;
            // Symlinks are unlinked, never followed.
            if file_type.is_dir() {
                Self::clean_dir(&path, report)?;
                std::fs::remove_dir(&path)
                    .map_err(|source| CleanupError::Remove { path, source })?;
                report.dirs_removed += 1;
            } else {
                std::fs::remove_file(&path)
                    .map_err(|source| CleanupError::Remove { path, source })?;
                report.files_removed += 1;
            }
        }
        Ok(())
    }
}

impl WorkspaceCleaner for FsCleaner {
    fn clean(&self, root: &Path) -> Result<CleanupReport, CleanupError> {
        let mut report = CleanupReport::default();
        if !root.exists() {
            return Ok(report);
        }
        Self::clean_dir(root, &mut report)?;
        Ok(report)
    }
}

/// A scratch root plus the cleaner that empties each invocation's
/// directory under it.
#[derive(Clone)]
pub struct Workspace {
    root: PathBuf,
    cleaner: Arc<dyn WorkspaceCleaner>,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace").field("root", &self.root).finish_non_exhaustive()
    }
}

impl Workspace {
    /// Use `root` as the workspace, creating it if missing.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory can't be created.
    pub fn acquire(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            cleaner: Arc::new(FsCleaner),
        })
    }

    /// Replace the cleaner.
    #[must_use]
    pub fn with_cleaner(mut self, cleaner: Arc<dyn WorkspaceCleaner>) -> Self {
        self.cleaner = cleaner;
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Acquire a private directory under the root for one invocation.
    ///
    /// The scope cleans it on drop unless a clean was already attempted,
    /// then removes the directory itself. Concurrent scopes never share a
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the invocation directory can't be created.
    pub fn scope(&self) -> std::io::Result<WorkspaceScope<'_>> {
        let dir = self.root.join(format!("invocation-{}", uuid::Uuid::new_v4().simple()));
        std::fs::create_dir(&dir)?;
        Ok(WorkspaceScope {
            workspace: self,
            dir,
            attempted: false,
        })
    }
}

/// One invocation's directory under the workspace root.
pub struct WorkspaceScope<'a> {
    workspace: &'a Workspace,
    dir: PathBuf,
    attempted: bool,
}

impl WorkspaceScope<'_> {
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.dir
    }

    /// Clean now and disarm the drop-time clean.
    ///
    /// # Errors
    ///
    /// Propagates the cleaner's error. The scope stays disarmed either way.
    pub fn clean(&mut self) -> Result<CleanupReport, CleanupError> {
        self.attempted = true;
        self.workspace.cleaner.clean(&self.dir)
    }
}

impl Drop for WorkspaceScope<'_> {
    fn drop(&mut self) {
        if !self.attempted {
            match self.workspace.cleaner.clean(&self.dir) {
                Ok(report) => tracing::debug!(
                    dir = %self.dir.display(),
                    files = report.files_removed,
                    dirs = report.dirs_removed,
                    "Workspace cleaned on scope exit"
                ),
                Err(e) => tracing::warn!(
                    dir = %self.dir.display(),
                    error = %e,
                    "Workspace cleanup on scope exit failed"
                ),
            }
        }
        match std::fs::remove_dir(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                dir = %self.dir.display(),
                error = %e,
                "Failed to release invocation directory"
            ),
        }
    }
}
