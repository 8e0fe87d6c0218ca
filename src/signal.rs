use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Interrupt state and in-progress artifacts for one process
#[derive(Clone, Debug)]
pub struct RunContext {
    interrupt_flag: Arc<AtomicBool>,
    active_artifacts: Arc<Mutex<HashSet<PathBuf>>>,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            interrupt_flag: Arc::new(AtomicBool::new(false)),
            active_artifacts: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Shared flag for the Ctrl-C handler and the dump wait loop
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        self.interrupt_flag.clone()
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupt_flag.load(Ordering::SeqCst)
    }

    /// Set interrupt state (mainly for testing)
    pub fn set_interrupted(&self, interrupted: bool) {
        self.interrupt_flag.store(interrupted, Ordering::SeqCst);
    }

    /// Track an artifact file this run has just created
    pub fn register_artifact(&self, path: PathBuf) -> ArtifactGuard {
        if let Ok(mut artifacts) = self.active_artifacts.lock() {
            artifacts.insert(path.clone());
        }
        ArtifactGuard {
            path,
            context: self.clone(),
            completed: false,
        }
    }

    pub fn active_artifacts(&self) -> Vec<PathBuf> {
        self.active_artifacts
            .lock()
            .map(|artifacts| artifacts.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove every tracked artifact that is still empty. Used by the signal
    /// handler before the process exits.
    pub fn discard_empty_artifacts(&self) -> Vec<PathBuf> {
        let mut removed = Vec::new();
        for path in self.active_artifacts() {
            match remove_if_empty(&path) {
                Ok(true) => removed.push(path.clone()),
                Ok(false) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "could not remove empty artifact"),
            }
            self.untrack(&path);
        }
        removed
    }

    fn untrack(&self, path: &Path) {
        if let Ok(mut artifacts) = self.active_artifacts.lock() {
            artifacts.remove(path);
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Delete `path` if it exists with zero length. Returns whether it was removed.
///
/// A zero-byte file named like a full backup would make the next run take
/// the incremental path, so these never outlive a failed run.
pub fn remove_if_empty(path: &Path) -> io::Result<bool> {
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_file() && metadata.len() == 0 => {
            fs::remove_file(path)?;
            Ok(true)
        }
        Ok(_) => Ok(false),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// RAII guard over a freshly created artifact: dropping it without
/// `complete()` removes the file if nothing was written to it.
#[derive(Debug)]
pub struct ArtifactGuard {
    path: PathBuf,
    context: RunContext,
    completed: bool,
}

impl ArtifactGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the artifact
    pub fn complete(mut self) {
        self.context.untrack(&self.path);
        self.completed = true;
    }

    /// Give up on the artifact now, removing it only if it is empty.
    /// A non-empty file is left in place for the operator to inspect.
    pub fn abandon(mut self) -> io::Result<bool> {
        self.completed = true;
        self.context.untrack(&self.path);
        remove_if_empty(&self.path)
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        self.context.untrack(&self.path);
        match remove_if_empty(&self.path) {
            Ok(true) => info!(path = %self.path.display(), "removed empty artifact"),
            Ok(false) => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "could not remove empty artifact"),
        }
    }
}
