use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, error};

/// Temporary directory removed on drop unless `keep` is set
#[derive(Debug)]
pub struct ScratchGuard {
    path: PathBuf,
    keep: bool,
}

impl ScratchGuard {
    pub fn new(path: PathBuf, keep: bool) -> Self {
        Self { path, keep }
    }
}

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        remove_scratch(&self.path, self.keep);
    }
}

/// Remove a temporary directory, a missing directory is not an error
pub fn remove_scratch(path: &Path, keep: bool) {
    if keep {
        debug!(path = ?path, "Keeping temporary directory");
        return;
    }

    match std::fs::remove_dir_all(path) {
        Ok(()) => debug!(path = ?path, "Removed temporary directory"),
        // nothing to clean, e.g. the run failed before the directory was created
        Err(error) if error.kind() == ErrorKind::NotFound => {}
        Err(error) => {
            error!(error = ?error, path = ?path, "Failed to remove temporary directory")
        }
    }
}
