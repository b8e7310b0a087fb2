use crate::workflow::runner::WorkflowResult;
use serde::{Deserialize, Serialize};
use trackcore::model::Dataset;

/// Snapshot of the latest workflow run, served to the presentation side.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SummaryModel {
    pub rows_in: usize,
    pub rows_corrected: usize,
    pub planarity: Dataset,
    pub straightness: Dataset,
    pub stage_notes: Vec<String>,
}

impl SummaryModel {
    pub fn from_result(result: &WorkflowResult) -> Self {
        Self {
            rows_in: result.rows_in,
            rows_corrected: result.rows_corrected,
            planarity: result.planarity.clone(),
            straightness: result.straightness.clone(),
            stage_notes: result.stage_notes.clone(),
        }
    }
}
