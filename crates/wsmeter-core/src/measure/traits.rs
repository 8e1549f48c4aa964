//! Size measurer abstraction and its error type.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::Duration;

/// Error type for measurement failures.
///
/// Every variant is treated as a permanent failure by the processor.
#[derive(Debug)]
pub enum MeasureError {
    /// The measuring process could not be started.
    Spawn { program: String, source: std::io::Error },
    /// I/O error while waiting on the measuring process.
    Io(std::io::Error),
    /// The measuring process did not finish in time and was killed.
    Timeout { path: PathBuf, limit: Duration },
    /// The measuring process exited unsuccessfully.
    Failed { status: ExitStatus, stderr: String },
    /// The measuring process succeeded but its output was not a byte count.
    Unparsable { stdout: String },
}

impl std::fmt::Display for MeasureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MeasureError::Spawn { program, source } => {
                write!(f, "failed to run {}: {}", program, source)
            }
            MeasureError::Io(e) => write!(f, "I/O error: {}", e),
            MeasureError::Timeout { path, limit } => write!(
                f,
                "measuring {} timed out after {}s",
                path.display(),
                limit.as_secs()
            ),
            MeasureError::Failed { status, stderr } => {
                write!(f, "du exited with {}: {}", status, stderr.trim_end())
            }
            MeasureError::Unparsable { stdout } => {
                write!(f, "output not an integer: {:?}", stdout)
            }
        }
    }
}

impl std::error::Error for MeasureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MeasureError::Spawn { source, .. } => Some(source),
            MeasureError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for MeasureError {
    fn from(e: std::io::Error) -> Self {
        MeasureError::Io(e)
    }
}

/// Measures the apparent byte size of a filesystem subtree.
///
/// Implementations must not follow symlinks out of the subtree and must
/// report hard-linked files once, as the underlying filesystem accounts for
/// them.
pub trait SizeMeasurer {
    /// Returns the total apparent size of `path` and everything below it.
    fn measure(&self, path: &Path) -> Result<u64, MeasureError>;
}

impl<M: SizeMeasurer + ?Sized> SizeMeasurer for &M {
    fn measure(&self, path: &Path) -> Result<u64, MeasureError> {
        (**self).measure(path)
    }
}
