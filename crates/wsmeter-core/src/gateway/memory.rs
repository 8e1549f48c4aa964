//! In-memory sink for tests.

use crate::gateway::{PublicationGateway, PublishError};
use crate::sample::UsageSample;

/// Keeps every published sample.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    samples: Vec<UsageSample>,
    fail_workspaces: Vec<String>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects samples for `workspace` with an I/O error.
    pub fn reject(mut self, workspace: impl Into<String>) -> Self {
        self.fail_workspaces.push(workspace.into());
        self
    }

    /// Samples published so far, in publication order.
    pub fn samples(&self) -> &[UsageSample] {
        &self.samples
    }

    /// Removes and returns all samples published so far.
    pub fn take(&mut self) -> Vec<UsageSample> {
        std::mem::take(&mut self.samples)
    }
}

impl PublicationGateway for MemoryGateway {
    fn publish(&mut self, sample: UsageSample) -> Result<(), PublishError> {
        if self.fail_workspaces.contains(&sample.workspace) {
            return Err(PublishError::Io(std::io::Error::other(format!(
                "rejected sample for {}",
                sample.workspace
            ))));
        }
        self.samples.push(sample);
        Ok(())
    }
}
