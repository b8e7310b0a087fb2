//! Core transformation pipeline for track-geometry inspection data.
//!
//! Position-indexed sensor readings flow through the stage graph
//! Raw -> OutlierRemoved -> Aggregated -> Corrected -> derived metrics.
//! Each stage owns an immutable snapshot of its output and recomputes when
//! its upstream data, upstream selection, or its own policy changes.

pub mod compute;
pub mod math;
pub mod model;
pub mod pipeline;
pub mod prelude;
pub mod processing;
pub mod telemetry;

pub use pipeline::{Pipeline, StageId};
pub use prelude::{StageError, StageResult, StageStatus};
