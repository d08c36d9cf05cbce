use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::PipelineError;

/// Fixed-path scratch artifacts owned for the duration of one tool invocation.
///
/// Acquiring the guard purges anything already at the paths; dropping it
/// purges them again, which also covers early returns and unwinding.
#[derive(Debug)]
pub struct ScratchGuard {
    paths: Vec<Utf8PathBuf>,
}

impl ScratchGuard {
    pub fn acquire(paths: Vec<Utf8PathBuf>) -> Result<Self, PipelineError> {
        for path in &paths {
            remove_path(path).map_err(|err| PipelineError::fs(format!("purge stale {path}"), err))?;
        }
        Ok(Self { paths })
    }

    pub fn paths(&self) -> &[Utf8PathBuf] {
        &self.paths
    }
}

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        for path in &self.paths {
            if let Err(err) = remove_path(path) {
                tracing::warn!("failed to remove scratch {path}: {err}");
            }
        }
    }
}

/// Runs `body` with `paths` cleared before and after, whatever `body` returns.
pub fn with_scratch<T, F>(paths: Vec<Utf8PathBuf>, body: F) -> Result<T, PipelineError>
where
    F: FnOnce(&ScratchGuard) -> Result<T, PipelineError>,
{
    let guard = ScratchGuard::acquire(paths)?;
    body(&guard)
}

fn remove_path(path: &Utf8Path) -> io::Result<()> {
    let metadata = match fs::symlink_metadata(path.as_std_path()) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };
    if metadata.is_dir() {
        fs::remove_dir_all(path.as_std_path())
    } else {
        fs::remove_file(path.as_std_path())
    }
}
