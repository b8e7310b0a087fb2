use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use trackcore::model::{
    AggregationPolicy, AggregationWindow, ApplyMode, OutlierSettings,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub rows: usize,
    pub window_rows: usize,
    pub seed: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            rows: 1024,
            window_rows: 4,
            seed: 0,
        }
    }
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(rows: usize, window_rows: usize) -> Self {
        Self {
            rows,
            window_rows,
            ..Default::default()
        }
    }

    pub fn aggregation_policy(&self) -> AggregationPolicy {
        AggregationPolicy {
            window: AggregationWindow::Rows(self.window_rows.max(1)),
            ..Default::default()
        }
    }

    /// Bulk cleanup with the default thresholds, so every registered
    /// channel of the synthetic run gets its spikes replaced.
    pub fn outlier_settings(&self) -> OutlierSettings {
        OutlierSettings {
            apply_mode: ApplyMode::Bulk,
            ..Default::default()
        }
    }
}
