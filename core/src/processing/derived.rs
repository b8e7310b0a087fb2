use std::sync::Arc;

use crate::compute::{AnalysisRequest, HeavyCompute};
use crate::model::{AnalysisWindowPolicy, CorrectionFactor, Dataset};
use crate::prelude::{StageError, StageResult};
use crate::telemetry::LogManager;

/// The derived geometry metrics the pipeline can stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    LevelDeviation,
    CrossLevel,
    GuideRailClearance,
    JointStep,
    Planarity,
    Straightness,
}

impl MetricKind {
    pub const ALL: [MetricKind; 6] = [
        MetricKind::LevelDeviation,
        MetricKind::CrossLevel,
        MetricKind::GuideRailClearance,
        MetricKind::JointStep,
        MetricKind::Planarity,
        MetricKind::Straightness,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            MetricKind::LevelDeviation => "level-deviation",
            MetricKind::CrossLevel => "cross-level",
            MetricKind::GuideRailClearance => "guiderail-clearance",
            MetricKind::JointStep => "step",
            MetricKind::Planarity => "planarity",
            MetricKind::Straightness => "straightness",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            MetricKind::LevelDeviation => 0,
            MetricKind::CrossLevel => 1,
            MetricKind::GuideRailClearance => 2,
            MetricKind::JointStep => 3,
            MetricKind::Planarity => 4,
            MetricKind::Straightness => 5,
        }
    }

    /// Metrics computed over spatial windows by the heavy backend rather
    /// than row by row.
    pub fn is_windowed(&self) -> bool {
        matches!(self, MetricKind::Planarity | MetricKind::Straightness)
    }

    pub fn required_channels(&self) -> &'static [&'static str] {
        match self {
            MetricKind::LevelDeviation => &["Level1", "Level2", "Level5", "Level6"],
            MetricKind::CrossLevel => &["Level1", "Level2"],
            MetricKind::GuideRailClearance => &["Level3", "Level4", "Encoder3"],
            MetricKind::JointStep => &["Level1", "Level2"],
            MetricKind::Planarity => &["Level1", "Level2", "Level5", "Level6"],
            MetricKind::Straightness => &["Level3", "Level4"],
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Computes a derived geometry dataset from the corrected stage output.
///
/// Row-wise metrics are evaluated in the core; the windowed ones are
/// delegated to the registered [`HeavyCompute`] backend.
pub struct DerivedEngine {
    backend: Option<Arc<dyn HeavyCompute>>,
    logger: LogManager,
}

impl DerivedEngine {
    pub fn new() -> Self {
        Self {
            backend: None,
            logger: LogManager::new(),
        }
    }

    pub fn with_backend(backend: Arc<dyn HeavyCompute>) -> Self {
        Self {
            backend: Some(backend),
            logger: LogManager::new(),
        }
    }

    pub fn set_backend(&mut self, backend: Arc<dyn HeavyCompute>) {
        self.backend = Some(backend);
    }

    pub fn compute(
        &self,
        metric: MetricKind,
        input: &Arc<Dataset>,
        window: &AnalysisWindowPolicy,
        correction: Option<CorrectionFactor>,
    ) -> StageResult<Dataset> {
        if input.is_empty() {
            return Ok(Dataset::new());
        }
        for channel in metric.required_channels() {
            if !input.has_channel(channel) {
                return Err(StageError::Data(format!(
                    "metric {} requires channel {}",
                    metric, channel
                )));
            }
        }
        if metric.is_windowed() {
            return self.delegate(metric, input, window, correction);
        }

        let index = input.index().to_vec();
        let travelled = input.travelled().to_vec();
        let mut output = Dataset::from_parts(index, travelled)?;
        match metric {
            MetricKind::LevelDeviation => {
                output.set_channel("Left", Self::difference(input, "Level6", "Level2")?)?;
                output.set_channel("Right", Self::difference(input, "Level5", "Level1")?)?;
            }
            MetricKind::CrossLevel | MetricKind::JointStep => {
                // Observed behaviour of the recording system: the inner
                // level channels already carry these readings directly.
                output.set_channel("Left", Self::column(input, "Level2")?)?;
                output.set_channel("Right", Self::column(input, "Level1")?)?;
            }
            MetricKind::GuideRailClearance => {
                let level3 = Self::column(input, "Level3")?;
                let level4 = Self::column(input, "Level4")?;
                let encoder = Self::column(input, "Encoder3")?;
                let clearance = level3
                    .iter()
                    .zip(&level4)
                    .zip(&encoder)
                    .map(|((a, b), c)| match (a, b, c) {
                        (Some(a), Some(b), Some(c)) => Some(a + b + c),
                        _ => None,
                    })
                    .collect();
                output.set_channel("GC", clearance)?;
            }
            MetricKind::Planarity | MetricKind::Straightness => unreachable!(),
        }

        if let Some(factor) = correction {
            if !factor.is_identity() {
                let names: Vec<String> = output.channel_names().map(str::to_string).collect();
                for name in names {
                    if let Some(column) = output.channel(&name) {
                        let scaled = column
                            .iter()
                            .map(|value| value.map(|v| factor.apply(v)))
                            .collect();
                        output.set_channel(&name, scaled)?;
                    }
                }
            }
        }
        self.logger
            .record(&format!("computed {} over {} rows", metric, output.len()));
        Ok(output)
    }

    fn delegate(
        &self,
        metric: MetricKind,
        input: &Arc<Dataset>,
        window: &AnalysisWindowPolicy,
        correction: Option<CorrectionFactor>,
    ) -> StageResult<Dataset> {
        window.validate()?;
        let Some(backend) = &self.backend else {
            return Err(StageError::Computation(format!(
                "no compute backend registered for {}",
                metric
            )));
        };
        let request = AnalysisRequest {
            metric,
            data: Arc::clone(input),
            window: window.clone(),
            correction,
        };
        self.logger
            .record(&format!("delegating {} to compute backend", metric));
        backend.compute(&request, None)
    }

    fn difference(data: &Dataset, minuend: &str, subtrahend: &str) -> StageResult<Vec<Option<f64>>> {
        let a = Self::column(data, minuend)?;
        let b = Self::column(data, subtrahend)?;
        Ok(a.iter()
            .zip(&b)
            .map(|(x, y)| match (x, y) {
                (Some(x), Some(y)) => Some(x - y),
                _ => None,
            })
            .collect())
    }

    fn column(data: &Dataset, name: &str) -> StageResult<Vec<Option<f64>>> {
        data.channel(name)
            .map(<[Option<f64>]>::to_vec)
            .ok_or_else(|| StageError::Data(format!("missing channel {}", name)))
    }
}

impl Default for DerivedEngine {
    fn default() -> Self {
        Self::new()
    }
}
