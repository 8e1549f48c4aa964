//! JSON-lines sink.

use std::fs::{File, OpenOptions};
use std::io::{self, Stdout, Write};
use std::path::Path;

use tracing::trace;

use crate::gateway::{PublicationGateway, PublishError};
use crate::sample::UsageSample;

/// Writes one JSON object per sample, one sample per line.
///
/// The writer is flushed after every record so a sample is delivered before
/// the next workspace is measured.
#[derive(Debug)]
pub struct JsonLinesGateway<W: Write> {
    writer: W,
    written: u64,
}

impl<W: Write> JsonLinesGateway<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Number of samples written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl JsonLinesGateway<Stdout> {
    /// Sink writing to standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl JsonLinesGateway<File> {
    /// Sink appending to `path`, creating the file if needed.
    pub fn append(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(file))
    }
}

impl<W: Write> PublicationGateway for JsonLinesGateway<W> {
    fn publish(&mut self, sample: UsageSample) -> Result<(), PublishError> {
        let mut line = serde_json::to_vec(&sample)?;
        line.push(b'\n');
        self.writer.write_all(&line)?;
        self.writer.flush()?;
        self.written += 1;
        trace!("Published sample {} for {}", sample.id, sample.workspace);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), PublishError> {
        self.writer.flush()?;
        Ok(())
    }
}
