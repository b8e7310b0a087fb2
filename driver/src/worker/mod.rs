pub mod planarity;
pub mod straightness;

use trackcore::compute::{AnalysisRequest, HeavyCompute, ProgressUpdate};
use trackcore::model::Dataset;
use trackcore::prelude::{StageError, StageResult};
use trackcore::processing::MetricKind;

/// In-process implementation of the windowed geometry metrics.
pub struct GeometryWorker;

impl GeometryWorker {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GeometryWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl HeavyCompute for GeometryWorker {
    fn compute(
        &self,
        request: &AnalysisRequest,
        progress: Option<&dyn Fn(ProgressUpdate)>,
    ) -> StageResult<Dataset> {
        match request.metric {
            MetricKind::Straightness => straightness::compute(
                &request.data,
                &request.window,
                request.correction,
                progress,
            ),
            MetricKind::Planarity => {
                planarity::compute(&request.data, &request.window, request.correction, progress)
            }
            other => Err(StageError::Computation(format!(
                "metric {} is not a windowed computation",
                other
            ))),
        }
    }
}
