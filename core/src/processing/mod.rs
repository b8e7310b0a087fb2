pub mod aggregate;
pub mod correction;
pub mod derived;
pub mod outlier;

pub use aggregate::AggregationEngine;
pub use correction::CorrectionEngine;
pub use derived::{DerivedEngine, MetricKind};
pub use outlier::OutlierEngine;
