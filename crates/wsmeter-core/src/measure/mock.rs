//! In-memory size measurer for testing processors without running `du`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use crate::measure::traits::{MeasureError, SizeMeasurer};

/// Size measurer backed by a path → size table.
///
/// Paths without an entry fail with a `NotFound` I/O error, paths
/// registered with [`MockMeasurer::fail`] with an unparsable-output error.
/// Every call is recorded so tests can check ordering.
#[derive(Debug, Clone, Default)]
pub struct MockMeasurer {
    sizes: HashMap<PathBuf, u64>,
    failures: HashMap<PathBuf, String>,
    calls: RefCell<Vec<PathBuf>>,
}

impl MockMeasurer {
    /// Creates a measurer that knows no paths.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a size for `path`.
    pub fn with_size(mut self, path: impl AsRef<Path>, bytes: u64) -> Self {
        self.sizes.insert(path.as_ref().to_path_buf(), bytes);
        self
    }

    /// Makes `path` fail as if `du` printed `output`.
    pub fn fail(mut self, path: impl AsRef<Path>, output: impl Into<String>) -> Self {
        self.failures
            .insert(path.as_ref().to_path_buf(), output.into());
        self
    }

    /// Paths measured so far, in call order.
    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.borrow().clone()
    }
}

impl SizeMeasurer for MockMeasurer {
    fn measure(&self, path: &Path) -> Result<u64, MeasureError> {
        self.calls.borrow_mut().push(path.to_path_buf());

        if let Some(output) = self.failures.get(path) {
            return Err(MeasureError::Unparsable {
                stdout: output.clone(),
            });
        }
        self.sizes.get(path).copied().ok_or_else(|| {
            MeasureError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no size known for {}", path.display()),
            ))
        })
    }
}
