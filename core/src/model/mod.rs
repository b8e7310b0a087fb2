pub mod channels;
pub mod dataset;
pub mod selection;
pub mod settings;

pub use channels::{is_registered, REGISTERED_CHANNELS};
pub use dataset::Dataset;
pub use selection::SelectionSet;
pub use settings::{
    AggregateMethod, AggregationPolicy, AggregationWindow, AnalysisOptions, AnalysisWindowPolicy,
    ApplyMode, ColumnOutlierPolicy, CorrectionFactor, CorrectionMap, OptionsDocument,
    OutlierSettings, PrepOptions,
};
