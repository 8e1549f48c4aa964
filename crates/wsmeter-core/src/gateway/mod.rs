//! Publication of usage samples.
//!
//! A gateway is created once at startup, handed to the scheduler by
//! reference for every cycle, and flushed on shutdown. Delivery failures
//! are reported back as [`PublishError`] but never stop a scan.

mod json;
mod memory;

pub use json::JsonLinesGateway;
pub use memory::MemoryGateway;

use crate::sample::UsageSample;

/// Error type for publication failures.
#[derive(Debug)]
pub enum PublishError {
    /// Writing to the sink failed.
    Io(std::io::Error),
    /// The sample could not be encoded.
    Serialize(serde_json::Error),
}

impl std::fmt::Display for PublishError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublishError::Io(e) => write!(f, "I/O error: {}", e),
            PublishError::Serialize(e) => write!(f, "serialization error: {}", e),
        }
    }
}

impl std::error::Error for PublishError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PublishError::Io(e) => Some(e),
            PublishError::Serialize(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for PublishError {
    fn from(e: std::io::Error) -> Self {
        PublishError::Io(e)
    }
}

impl From<serde_json::Error> for PublishError {
    fn from(e: serde_json::Error) -> Self {
        PublishError::Serialize(e)
    }
}

/// Destination for usage samples.
///
/// Calls are sequential; implementations need not be thread-safe.
pub trait PublicationGateway {
    /// Takes ownership of `sample` and delivers it.
    fn publish(&mut self, sample: UsageSample) -> Result<(), PublishError>;

    /// Pushes out anything buffered. Called on shutdown.
    fn flush(&mut self) -> Result<(), PublishError> {
        Ok(())
    }
}

impl<G: PublicationGateway + ?Sized> PublicationGateway for Box<G> {
    fn publish(&mut self, sample: UsageSample) -> Result<(), PublishError> {
        (**self).publish(sample)
    }

    fn flush(&mut self) -> Result<(), PublishError> {
        (**self).flush()
    }
}
