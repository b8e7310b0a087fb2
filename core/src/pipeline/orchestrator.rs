use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::compute::HeavyCompute;
use crate::model::{
    AggregationPolicy, AnalysisOptions, CorrectionMap, Dataset, OptionsDocument, OutlierSettings,
    SelectionSet, REGISTERED_CHANNELS,
};
use crate::pipeline::debounce::{CommitGate, DEFAULT_DEBOUNCE};
use crate::pipeline::state::{StageId, StageState};
use crate::prelude::{StageError, StageResult, StageStatus};
use crate::processing::{
    AggregationEngine, CorrectionEngine, DerivedEngine, MetricKind, OutlierEngine,
};
use crate::telemetry::{LogManager, MetricsRecorder};

/// One pending settings change, staged through the debounce gate.
#[derive(Debug, Clone)]
pub enum SettingsEdit {
    Outlier(OutlierSettings),
    Aggregation(AggregationPolicy),
    Correction(CorrectionMap),
    Analysis(MetricKind, AnalysisOptions),
}

impl SettingsEdit {
    fn key(&self) -> String {
        match self {
            SettingsEdit::Outlier(_) => "prep/outlier".into(),
            SettingsEdit::Aggregation(_) => "prep/aggregation".into(),
            SettingsEdit::Correction(_) => "prep/scale-offset".into(),
            SettingsEdit::Analysis(metric, _) => format!("analysis/{}", metric),
        }
    }

    fn validate(&self) -> StageResult<()> {
        match self {
            SettingsEdit::Outlier(settings) => settings.validate(),
            SettingsEdit::Aggregation(policy) => policy.validate(),
            SettingsEdit::Correction(_) => Ok(()),
            SettingsEdit::Analysis(_, options) => options.window.validate(),
        }
    }
}

struct StageStates {
    raw: StageState,
    outlier_removed: StageState,
    aggregated: StageState,
    corrected: StageState,
    derived: [StageState; 6],
}

impl StageStates {
    fn new() -> Self {
        Self {
            raw: StageState::new(),
            outlier_removed: StageState::new(),
            aggregated: StageState::new(),
            corrected: StageState::new(),
            derived: Default::default(),
        }
    }

    fn get(&self, id: StageId) -> &StageState {
        match id {
            StageId::Raw => &self.raw,
            StageId::OutlierRemoved => &self.outlier_removed,
            StageId::Aggregated => &self.aggregated,
            StageId::Corrected => &self.corrected,
            StageId::Derived(metric) => &self.derived[metric.index()],
        }
    }

    fn get_mut(&mut self, id: StageId) -> &mut StageState {
        match id {
            StageId::Raw => &mut self.raw,
            StageId::OutlierRemoved => &mut self.outlier_removed,
            StageId::Aggregated => &mut self.aggregated,
            StageId::Corrected => &mut self.corrected,
            StageId::Derived(metric) => &mut self.derived[metric.index()],
        }
    }
}

/// Reactive coordinator of the stage graph.
///
/// Owns the four engines, the settings document, and the per-stage state.
/// Data and settings changes recompute the touched stage and every
/// transitive dependent, in dependency order; everything in between flows
/// as `Arc<Dataset>` snapshots.
pub struct Pipeline {
    options: OptionsDocument,
    outlier: OutlierEngine,
    aggregation: AggregationEngine,
    correction: CorrectionEngine,
    derived: DerivedEngine,
    stages: StageStates,
    gate: CommitGate<SettingsEdit>,
    preserve_selections: bool,
    metrics: MetricsRecorder,
    logger: LogManager,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::with_debounce(DEFAULT_DEBOUNCE)
    }

    pub fn with_debounce(window: Duration) -> Self {
        Self {
            options: OptionsDocument::default(),
            outlier: OutlierEngine::new(),
            aggregation: AggregationEngine::new(),
            correction: CorrectionEngine::new(),
            derived: DerivedEngine::new(),
            stages: StageStates::new(),
            gate: CommitGate::new(window),
            preserve_selections: false,
            metrics: MetricsRecorder::new(),
            logger: LogManager::new(),
        }
    }

    /// Keeps each stage's row selection across recomputes, pruned to the
    /// regenerated length. By default a recomputed stage resets its
    /// selection to all rows.
    pub fn set_preserve_selections(&mut self, preserve: bool) {
        self.preserve_selections = preserve;
    }

    /// Registers the collaborator executing the windowed metrics. Stages
    /// already computed are not revisited; call [`Pipeline::recompute_all`]
    /// to pick the backend up for existing data.
    pub fn set_compute_backend(&mut self, backend: Arc<dyn HeavyCompute>) {
        self.derived.set_backend(backend);
    }

    pub fn options(&self) -> &OptionsDocument {
        &self.options
    }

    pub fn output(&self, id: StageId) -> Arc<Dataset> {
        Arc::clone(self.stages.get(id).output())
    }

    pub fn status(&self, id: StageId) -> StageStatus {
        self.stages.get(id).status().clone()
    }

    pub fn selection(&self, id: StageId) -> &SelectionSet {
        self.stages.get(id).selection()
    }

    /// `(recomputes, failures, superseded)` counters since construction.
    pub fn metrics(&self) -> (usize, usize, usize) {
        self.metrics.snapshot()
    }

    /// Replaces the raw stage wholesale and recomputes everything below it.
    pub fn load_raw(&mut self, dataset: Dataset) -> StageResult<()> {
        dataset.validate()?;
        self.logger
            .record(&format!("loading {} raw rows", dataset.len()));
        let token = self.stages.raw.begin();
        let preserve = self.preserve_selections;
        if self
            .stages
            .raw
            .install(token, Arc::new(dataset), StageStatus::Ready, preserve)
        {
            self.metrics.record_recompute();
        }
        self.cascade(StageId::Raw.downstream());
        Ok(())
    }

    pub fn set_outlier_settings(&mut self, settings: OutlierSettings) -> StageResult<()> {
        settings.validate()?;
        self.options.prep.outlier_removal = settings;
        self.cascade_from(StageId::OutlierRemoved);
        Ok(())
    }

    pub fn set_aggregation_policy(&mut self, policy: AggregationPolicy) -> StageResult<()> {
        policy.validate()?;
        self.options.prep.aggregation = policy;
        self.cascade_from(StageId::Aggregated);
        Ok(())
    }

    pub fn set_correction_map(&mut self, map: CorrectionMap) -> StageResult<()> {
        self.options.prep.scale_offset = map;
        self.cascade_from(StageId::Corrected);
        Ok(())
    }

    pub fn set_analysis_options(
        &mut self,
        metric: MetricKind,
        options: AnalysisOptions,
    ) -> StageResult<()> {
        options.window.validate()?;
        self.options.analysis.insert(metric.id().into(), options);
        self.cascade_from(StageId::Derived(metric));
        Ok(())
    }

    /// Replaces a stage's row selection and recomputes its dependents. The
    /// stage itself is never recomputed by a selection change.
    pub fn set_selection(&mut self, id: StageId, selection: SelectionSet) {
        self.stages.get_mut(id).set_selection(selection);
        self.cascade(id.downstream());
    }

    /// Validates and stages an edit without committing it. Edits to the
    /// same settings key within the debounce window supersede each other.
    pub fn queue_edit(&mut self, edit: SettingsEdit, now: Instant) -> StageResult<u64> {
        edit.validate()?;
        let staged = self.gate.stage(&edit.key(), edit, now);
        if staged.superseded.is_some() {
            self.metrics.record_superseded();
        }
        Ok(staged.token)
    }

    /// Commits the staged edits whose debounce deadline has passed and
    /// returns how many were applied.
    pub fn flush_edits(&mut self, now: Instant) -> usize {
        let due = self.gate.flush(now);
        let count = due.len();
        for (_, _, edit) in due {
            self.apply_edit(edit);
        }
        count
    }

    /// Drops the correction cache and recomputes every stage below Raw.
    pub fn recompute_all(&mut self) {
        self.correction.invalidate();
        self.cascade(StageId::Raw.downstream());
    }

    fn apply_edit(&mut self, edit: SettingsEdit) {
        match edit {
            SettingsEdit::Outlier(settings) => {
                self.options.prep.outlier_removal = settings;
                self.cascade_from(StageId::OutlierRemoved);
            }
            SettingsEdit::Aggregation(policy) => {
                self.options.prep.aggregation = policy;
                self.cascade_from(StageId::Aggregated);
            }
            SettingsEdit::Correction(map) => {
                self.options.prep.scale_offset = map;
                self.cascade_from(StageId::Corrected);
            }
            SettingsEdit::Analysis(metric, options) => {
                self.options.analysis.insert(metric.id().into(), options);
                self.cascade_from(StageId::Derived(metric));
            }
        }
    }

    fn cascade_from(&mut self, id: StageId) {
        self.recompute(id);
        self.cascade(id.downstream());
    }

    fn cascade(&mut self, stages: Vec<StageId>) {
        for id in stages {
            self.recompute(id);
        }
    }

    fn recompute(&mut self, id: StageId) {
        let Some(upstream_id) = id.upstream() else {
            return;
        };
        let (upstream_output, upstream_selection) = {
            let upstream = self.stages.get(upstream_id);
            (Arc::clone(upstream.output()), upstream.selection().clone())
        };
        let state = self.stages.get_mut(id);
        let token = state.begin();
        let input = state.refresh_input(&upstream_output, &upstream_selection);

        let result: StageResult<Arc<Dataset>> = match id {
            StageId::Raw => unreachable!(),
            StageId::OutlierRemoved => self
                .outlier
                .apply(&input, &REGISTERED_CHANNELS, &self.options.prep.outlier_removal)
                .map(Arc::new),
            StageId::Aggregated => self
                .aggregation
                .aggregate(&input, &self.options.prep.aggregation)
                .map(Arc::new),
            StageId::Corrected => self.correction.apply(&input, &self.options.prep.scale_offset),
            StageId::Derived(metric) => {
                let options = self
                    .options
                    .analysis
                    .get(metric.id())
                    .copied()
                    .unwrap_or_else(|| AnalysisOptions::default_for(metric.id()));
                self.derived
                    .compute(metric, &input, &options.window, Some(options.correction))
                    .map(Arc::new)
            }
        };

        match result {
            Ok(output) => {
                let preserve = self.preserve_selections;
                if self
                    .stages
                    .get_mut(id)
                    .install(token, output, StageStatus::Ready, preserve)
                {
                    self.metrics.record_recompute();
                } else {
                    self.metrics.record_superseded();
                }
            }
            Err(StageError::Computation(message)) => {
                // Worker failure: surface the error, keep the staged data.
                self.logger
                    .alert(&format!("stage {} failed: {}", id, message));
                self.stages
                    .get_mut(id)
                    .fail_keeping_output(token, message);
                self.metrics.record_failure();
            }
            Err(err) => {
                // Invalid settings or data: dependents see an empty input
                // and stage empty outputs without faulting themselves.
                let message = err.to_string();
                self.logger
                    .alert(&format!("stage {} rejected: {}", id, message));
                let preserve = self.preserve_selections;
                self.stages.get_mut(id).install(
                    token,
                    Arc::new(input.empty_schema()),
                    StageStatus::Error(message),
                    preserve,
                );
                self.metrics.record_failure();
            }
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{AnalysisRequest, ProgressUpdate};
    use crate::model::{AggregateMethod, AggregationWindow, ColumnOutlierPolicy, CorrectionFactor};

    struct StubBackend {
        result: StageResult<Dataset>,
    }

    impl HeavyCompute for StubBackend {
        fn compute(
            &self,
            _request: &AnalysisRequest,
            _progress: Option<&dyn Fn(ProgressUpdate)>,
        ) -> StageResult<Dataset> {
            self.result.clone()
        }
    }

    fn windowed_stub() -> Arc<StubBackend> {
        let mut result = Dataset::new();
        result.push_row(1, 0.0, &[("PL", Some(0.25))]);
        Arc::new(StubBackend { result: Ok(result) })
    }

    fn raw_dataset() -> Dataset {
        let mut data = Dataset::new();
        for row in 0..8u64 {
            let base = row as f64;
            // One spike on Level1 for the outlier stage to clean up.
            let level1 = if row == 5 { 500.0 } else { base };
            data.push_row(
                row,
                base * 0.25,
                &[
                    ("Level1", Some(level1)),
                    ("Level2", Some(base + 1.0)),
                    ("Level3", Some(base + 2.0)),
                    ("Level4", Some(base + 3.0)),
                    ("Level5", Some(base + 4.0)),
                    ("Level6", Some(base + 5.0)),
                    ("Encoder3", Some(1.0)),
                ],
            );
        }
        data
    }

    fn pipeline_with_data() -> Pipeline {
        let mut pipeline = Pipeline::new();
        pipeline.set_compute_backend(windowed_stub());
        pipeline.load_raw(raw_dataset()).unwrap();
        pipeline
    }

    fn outlier_on(column: &str) -> OutlierSettings {
        let mut settings = OutlierSettings::default();
        settings.columns.insert(
            column.into(),
            ColumnOutlierPolicy {
                use_z_score: false,
                ..Default::default()
            },
        );
        settings
    }

    #[test]
    fn loading_raw_data_stages_every_dependent() {
        let pipeline = pipeline_with_data();
        for id in StageId::all() {
            assert_eq!(pipeline.status(id), StageStatus::Ready, "stage {}", id);
        }
        assert_eq!(pipeline.output(StageId::Corrected).len(), 8);
        let deviation = pipeline.output(StageId::Derived(MetricKind::LevelDeviation));
        assert_eq!(deviation.channel("Left").unwrap()[0], Some(4.0));
        assert_eq!(
            pipeline
                .output(StageId::Derived(MetricKind::Planarity))
                .channel("PL")
                .unwrap(),
            &[Some(0.25)]
        );
    }

    #[test]
    fn outlier_settings_commit_and_cascade() {
        let mut pipeline = pipeline_with_data();
        pipeline.set_outlier_settings(outlier_on("Level1")).unwrap();
        let cleaned = pipeline.output(StageId::OutlierRemoved);
        // The spike is replaced by the mean of its neighbours.
        assert_eq!(cleaned.channel("Level1").unwrap()[5], Some(5.0));
        // Default 1-row windows: the cleaned value reaches the corrected stage.
        assert_eq!(
            pipeline.output(StageId::Corrected).channel("Level1").unwrap()[5],
            Some(5.0)
        );
    }

    #[test]
    fn invalid_settings_are_rejected_without_committing() {
        let mut pipeline = pipeline_with_data();
        let before = pipeline.output(StageId::Aggregated);
        let result = pipeline.set_aggregation_policy(AggregationPolicy {
            window: AggregationWindow::Rows(0),
            ..Default::default()
        });
        assert!(matches!(result, Err(StageError::Configuration(_))));
        assert_eq!(
            pipeline.options().prep.aggregation.window,
            AggregationWindow::Rows(1)
        );
        assert!(Arc::ptr_eq(&before, &pipeline.output(StageId::Aggregated)));
    }

    #[test]
    fn aggregation_policy_shrinks_downstream_stages() {
        let mut pipeline = pipeline_with_data();
        pipeline
            .set_aggregation_policy(AggregationPolicy {
                window: AggregationWindow::Rows(4),
                method: AggregateMethod::Mean,
                ema_span: 5,
            })
            .unwrap();
        assert_eq!(pipeline.output(StageId::Aggregated).len(), 2);
        assert_eq!(pipeline.output(StageId::Corrected).len(), 2);
        assert_eq!(
            pipeline
                .output(StageId::Derived(MetricKind::CrossLevel))
                .len(),
            2
        );
        // The stage above is untouched.
        assert_eq!(pipeline.output(StageId::OutlierRemoved).len(), 8);
    }

    #[test]
    fn correction_edits_never_compound() {
        let mut pipeline = pipeline_with_data();
        let raw_value = pipeline.output(StageId::Aggregated).channel("Level2").unwrap()[0];
        assert_eq!(raw_value, Some(1.0));

        let mut map = CorrectionMap::new();
        map.set("Level2", CorrectionFactor::new(2.0, 0.0));
        pipeline.set_correction_map(map).unwrap();
        assert_eq!(
            pipeline.output(StageId::Corrected).channel("Level2").unwrap()[0],
            Some(2.0)
        );

        let mut map = CorrectionMap::new();
        map.set("Level2", CorrectionFactor::new(3.0, 0.0));
        pipeline.set_correction_map(map).unwrap();
        assert_eq!(
            pipeline.output(StageId::Corrected).channel("Level2").unwrap()[0],
            Some(3.0)
        );
    }

    #[test]
    fn unchanged_correction_map_reuses_the_staged_output() {
        let mut pipeline = pipeline_with_data();
        let mut map = CorrectionMap::new();
        map.set("Level2", CorrectionFactor::new(2.0, 0.5));
        pipeline.set_correction_map(map.clone()).unwrap();
        let first = pipeline.output(StageId::Corrected);
        pipeline.set_correction_map(map).unwrap();
        assert!(Arc::ptr_eq(&first, &pipeline.output(StageId::Corrected)));
    }

    #[test]
    fn selection_gates_downstream_without_touching_the_stage() {
        let mut pipeline = pipeline_with_data();
        let aggregated = pipeline.output(StageId::Aggregated);
        pipeline.set_selection(StageId::Aggregated, SelectionSet::from_rows([0, 1, 2]));
        // The stage itself did not recompute.
        assert!(Arc::ptr_eq(&aggregated, &pipeline.output(StageId::Aggregated)));
        assert_eq!(pipeline.output(StageId::Corrected).len(), 3);
        assert_eq!(
            pipeline
                .output(StageId::Derived(MetricKind::GuideRailClearance))
                .len(),
            3
        );
    }

    #[test]
    fn preserved_selection_survives_a_policy_edit() {
        let mut pipeline = pipeline_with_data();
        pipeline.set_preserve_selections(true);
        pipeline.set_selection(StageId::Aggregated, SelectionSet::from_rows([0, 2, 7]));

        // Four-row windows shrink the stage to 2 rows; the kept selection
        // is pruned to the regenerated length instead of being reset.
        pipeline
            .set_aggregation_policy(AggregationPolicy {
                window: AggregationWindow::Rows(4),
                method: AggregateMethod::Mean,
                ema_span: 5,
            })
            .unwrap();
        assert_eq!(
            pipeline
                .selection(StageId::Aggregated)
                .iter()
                .collect::<Vec<_>>(),
            vec![0]
        );
        assert_eq!(pipeline.output(StageId::Corrected).len(), 1);

        // The default behavior still resets to all rows.
        pipeline.set_preserve_selections(false);
        pipeline
            .set_aggregation_policy(AggregationPolicy {
                window: AggregationWindow::Rows(2),
                method: AggregateMethod::Mean,
                ema_span: 5,
            })
            .unwrap();
        assert!(pipeline.selection(StageId::Aggregated).covers_all(4));
        assert_eq!(pipeline.output(StageId::Corrected).len(), 4);
    }

    #[test]
    fn missing_channels_fault_only_the_derived_stage() {
        let mut pipeline = Pipeline::new();
        let mut data = Dataset::new();
        for row in 0..4u64 {
            data.push_row(
                row,
                row as f64,
                &[("Level1", Some(1.0)), ("Level2", Some(2.0))],
            );
        }
        pipeline.load_raw(data).unwrap();

        assert_eq!(pipeline.status(StageId::Corrected), StageStatus::Ready);
        assert!(matches!(
            pipeline.status(StageId::Derived(MetricKind::LevelDeviation)),
            StageStatus::Error(_)
        ));
        assert!(pipeline
            .output(StageId::Derived(MetricKind::LevelDeviation))
            .is_empty());
        // Cross level only needs Level1/Level2 and still computes.
        assert_eq!(
            pipeline.status(StageId::Derived(MetricKind::CrossLevel)),
            StageStatus::Ready
        );
    }

    #[test]
    fn worker_failure_keeps_previously_staged_output() {
        let mut pipeline = pipeline_with_data();
        let staged = pipeline.output(StageId::Derived(MetricKind::Planarity));
        assert!(!staged.is_empty());

        pipeline.set_compute_backend(Arc::new(StubBackend {
            result: Err(StageError::Computation("worker exited".into())),
        }));
        pipeline.recompute_all();

        let planarity = StageId::Derived(MetricKind::Planarity);
        assert!(matches!(pipeline.status(planarity), StageStatus::Error(_)));
        assert_eq!(*pipeline.output(planarity), *staged);
    }

    #[test]
    fn queued_edits_coalesce_into_one_commit() {
        let mut pipeline = pipeline_with_data();
        let start = Instant::now();
        for size in [2usize, 3, 4] {
            pipeline
                .queue_edit(
                    SettingsEdit::Aggregation(AggregationPolicy {
                        window: AggregationWindow::Rows(size),
                        ..Default::default()
                    }),
                    start,
                )
                .unwrap();
        }
        assert_eq!(pipeline.flush_edits(start + Duration::from_millis(10)), 0);
        assert_eq!(pipeline.flush_edits(start + Duration::from_millis(200)), 1);
        assert_eq!(pipeline.output(StageId::Aggregated).len(), 2);
        let (_, _, superseded) = pipeline.metrics();
        assert_eq!(superseded, 2);
    }

    #[test]
    fn queued_edit_validation_happens_at_queue_time() {
        let mut pipeline = pipeline_with_data();
        let result = pipeline.queue_edit(
            SettingsEdit::Aggregation(AggregationPolicy {
                window: AggregationWindow::Distance(-1.0),
                ..Default::default()
            }),
            Instant::now(),
        );
        assert!(matches!(result, Err(StageError::Configuration(_))));
        assert_eq!(pipeline.flush_edits(Instant::now() + Duration::from_secs(1)), 0);
    }

    #[test]
    fn empty_raw_dataset_flows_as_empty_everywhere() {
        let mut pipeline = Pipeline::new();
        pipeline.set_compute_backend(windowed_stub());
        pipeline.load_raw(Dataset::new()).unwrap();
        for id in StageId::all() {
            assert!(pipeline.output(id).is_empty(), "stage {}", id);
        }
    }
}
