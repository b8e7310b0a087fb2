use std::sync::Arc;

use crate::model::{AnalysisWindowPolicy, CorrectionFactor, Dataset};
use crate::prelude::StageResult;
use crate::processing::MetricKind;

/// Progress notification emitted by a heavy-computation backend while it
/// works through spatial windows.
#[derive(Debug, Clone, Copy)]
pub struct ProgressUpdate {
    pub done: usize,
    pub total: usize,
}

/// Request contract for the external heavy-computation collaborator.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub metric: MetricKind,
    pub data: Arc<Dataset>,
    pub window: AnalysisWindowPolicy,
    pub correction: Option<CorrectionFactor>,
}

/// Backend executing the vehicle-scale windowed metrics (plane deviation,
/// windowed standard deviation) outside the core. Implementations apply
/// the request's correction themselves; on error the caller keeps its
/// previously staged output.
pub trait HeavyCompute: Send + Sync {
    fn compute(
        &self,
        request: &AnalysisRequest,
        progress: Option<&dyn Fn(ProgressUpdate)>,
    ) -> StageResult<Dataset>;
}
