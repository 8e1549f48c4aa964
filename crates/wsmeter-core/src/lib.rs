//! wsmeter-core — workspace storage sampling library.
//!
//! Provides:
//! - `measure` — subtree size measurement (`du` backed, plus a mock)
//! - `discover` — workspace directory discovery
//! - `sample` — usage sample records
//! - `processor` — turns sample requests into publish/fail actions
//! - `gateway` — publication sinks for usage samples
//! - `scheduler` — the self-pacing scan loop
//! - `fmt` — formatting helpers for log output

pub mod discover;
pub mod fmt;
pub mod gateway;
pub mod measure;
pub mod processor;
pub mod sample;
pub mod scheduler;

pub use discover::{DiscoverError, SampleRequest, discover};
pub use gateway::{JsonLinesGateway, MemoryGateway, PublicationGateway, PublishError};
pub use measure::{DuMeasurer, MeasureError, MockMeasurer, SizeMeasurer};
pub use processor::{CycleResult, ProcessingAction, SampleProcessor};
pub use sample::{EFS_STORAGE_SKU, UsageSample};
pub use scheduler::{
    CycleReport, RunOutcome, ScanState, Scheduler, SchedulerConfig, SchedulerError, pacing_delay,
};
