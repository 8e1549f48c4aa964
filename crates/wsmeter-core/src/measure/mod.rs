//! Subtree size measurement.
//!
//! Workspace footprints are computed by an external, mature primitive
//! (`du` from coreutils) rather than by walking the tree in-process. The
//! primitive sits behind the [`SizeMeasurer`] trait so tests can substitute
//! an in-memory table.
//!
//! # Architecture
//!
//! ```text
//!              ┌─────────────────┐
//!              │ SampleProcessor │
//!              └────────┬────────┘
//!                       │
//!                ┌──────▼──────┐
//!                │SizeMeasurer │ (trait)
//!                └──────┬──────┘
//!            ┌──────────┴──────────┐
//!     ┌──────▼──────┐       ┌──────▼──────┐
//!     │ DuMeasurer  │       │MockMeasurer │
//!     │ (du -s)     │       │ (Testing)   │
//!     └─────────────┘       └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::path::Path;
//! use wsmeter_core::measure::{DuMeasurer, SizeMeasurer};
//!
//! let du = DuMeasurer::new();
//! let bytes = du.measure(Path::new("/srv/workspaces/alice")).unwrap();
//! println!("{bytes} bytes");
//! ```

mod du;
pub mod mock;
pub mod traits;

pub use du::{DEFAULT_TIMEOUT, DuMeasurer, parse_du_output};
pub use mock::MockMeasurer;
pub use traits::{MeasureError, SizeMeasurer};
