use crate::worker::GeometryWorker;
use crate::workflow::config::WorkflowConfig;
use anyhow::Context;
use std::sync::Arc;
use trackcore::model::Dataset;
use trackcore::pipeline::{Pipeline, StageId};
use trackcore::prelude::StageStatus;
use trackcore::processing::MetricKind;

pub struct WorkflowResult {
    pub rows_in: usize,
    pub rows_corrected: usize,
    pub planarity: Dataset,
    pub straightness: Dataset,
    pub stage_notes: Vec<String>,
}

/// Drives one dataset through a fresh pipeline configured from the
/// workflow config.
#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self, dataset: &Dataset) -> anyhow::Result<WorkflowResult> {
        let mut pipeline = Pipeline::new();
        pipeline.set_compute_backend(Arc::new(GeometryWorker::new()));
        pipeline
            .set_outlier_settings(self.config.outlier_settings())
            .context("configuring the outlier stage")?;
        pipeline
            .set_aggregation_policy(self.config.aggregation_policy())
            .context("configuring the aggregation stage")?;
        pipeline
            .load_raw(dataset.clone())
            .context("loading raw data into the pipeline")?;

        let mut stage_notes = Vec::new();
        for id in StageId::all() {
            let note = match pipeline.status(id) {
                StageStatus::Idle => format!("{}: idle", id),
                StageStatus::Ready => {
                    format!("{}: {} rows", id, pipeline.output(id).len())
                }
                StageStatus::Error(message) => format!("{}: error ({})", id, message),
            };
            stage_notes.push(note);
        }

        Ok(WorkflowResult {
            rows_in: dataset.len(),
            rows_corrected: pipeline.output(StageId::Corrected).len(),
            planarity: (*pipeline.output(StageId::Derived(MetricKind::Planarity))).clone(),
            straightness: (*pipeline.output(StageId::Derived(MetricKind::Straightness))).clone(),
            stage_notes,
        })
    }
}
