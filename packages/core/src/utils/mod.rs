//! Utilities
//!
//! Exchange-format plumbing shared across the pipeline.

pub mod graphml;

pub use graphml::{GraphMlExporter, GraphMlImporter};
