use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::prelude::{StageError, StageResult};

/// Per-column outlier detection policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ColumnOutlierPolicy {
    pub use_iqr: bool,
    pub iqr_multiplier: f64,
    pub use_z_score: bool,
    pub z_score_threshold: f64,
}

impl Default for ColumnOutlierPolicy {
    fn default() -> Self {
        Self {
            use_iqr: true,
            iqr_multiplier: 1.5,
            use_z_score: true,
            z_score_threshold: 3.0,
        }
    }
}

impl ColumnOutlierPolicy {
    pub fn validate(&self) -> StageResult<()> {
        if self.iqr_multiplier <= 0.0 {
            return Err(StageError::Configuration(
                "IQR multiplier must be positive".into(),
            ));
        }
        if self.z_score_threshold <= 0.0 {
            return Err(StageError::Configuration(
                "Z-score threshold must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Whether one bulk policy overrides every target column or each column
/// uses its own entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyMode {
    #[default]
    Individual,
    Bulk,
}

/// Full outlier-stage settings: apply mode, bulk policy, per-column map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OutlierSettings {
    pub apply_mode: ApplyMode,
    pub bulk: ColumnOutlierPolicy,
    pub columns: BTreeMap<String, ColumnOutlierPolicy>,
}

impl OutlierSettings {
    pub fn validate(&self) -> StageResult<()> {
        self.bulk.validate()?;
        for policy in self.columns.values() {
            policy.validate()?;
        }
        Ok(())
    }

    /// Effective policy for `column` under the current apply mode. `None`
    /// means the column is left untouched.
    pub fn policy_for(&self, column: &str) -> Option<ColumnOutlierPolicy> {
        match self.apply_mode {
            ApplyMode::Bulk => Some(self.bulk),
            ApplyMode::Individual => self.columns.get(column).copied(),
        }
    }
}

/// Linear `(scaler, offset)` transform applied to one column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionFactor {
    pub scaler: f64,
    pub offset: f64,
}

impl Default for CorrectionFactor {
    fn default() -> Self {
        Self {
            scaler: 1.0,
            offset: 0.0,
        }
    }
}

impl CorrectionFactor {
    pub fn new(scaler: f64, offset: f64) -> Self {
        Self { scaler, offset }
    }

    pub fn is_identity(&self) -> bool {
        self.scaler == 1.0 && self.offset == 0.0
    }

    pub fn apply(&self, value: f64) -> f64 {
        value * self.scaler + self.offset
    }
}

/// Column -> correction factor map for one namespace (preprocessing or a
/// single analysis module).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrectionMap(BTreeMap<String, CorrectionFactor>);

impl CorrectionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, column: &str, factor: CorrectionFactor) {
        self.0.insert(column.to_string(), factor);
    }

    pub fn remove(&mut self, column: &str) {
        self.0.remove(column);
    }

    pub fn get(&self, column: &str) -> Option<CorrectionFactor> {
        self.0.get(column).copied()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Columns whose factor differs from `prior`, is newly present, or was
    /// removed (a removed column reverts to the raw values).
    pub fn changed_since(&self, prior: &CorrectionMap) -> Vec<String> {
        let mut changed = Vec::new();
        for (column, factor) in &self.0 {
            if prior.0.get(column) != Some(factor) {
                changed.push(column.clone());
            }
        }
        for column in prior.0.keys() {
            if !self.0.contains_key(column) {
                changed.push(column.clone());
            }
        }
        changed
    }
}

impl FromIterator<(String, CorrectionFactor)> for CorrectionMap {
    fn from_iter<I: IntoIterator<Item = (String, CorrectionFactor)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Reduction applied to each aggregation window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateMethod {
    Median,
    #[default]
    Mean,
    Ema,
}

/// Window partitioning for the aggregation stage. Call sites historically
/// disagreed on the semantics, so both are explicit: a plain row count or
/// a spatial distance along `Travelled`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationWindow {
    Rows(usize),
    Distance(f64),
}

impl Default for AggregationWindow {
    fn default() -> Self {
        AggregationWindow::Rows(1)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AggregationPolicy {
    pub window: AggregationWindow,
    pub method: AggregateMethod,
    pub ema_span: usize,
}

impl AggregationPolicy {
    pub fn validate(&self) -> StageResult<()> {
        match self.window {
            AggregationWindow::Rows(size) if size == 0 => {
                return Err(StageError::Configuration(
                    "aggregation window size must be positive".into(),
                ));
            }
            AggregationWindow::Distance(interval) if !(interval > 0.0) => {
                return Err(StageError::Configuration(
                    "aggregation interval must be positive".into(),
                ));
            }
            _ => {}
        }
        if self.method == AggregateMethod::Ema && self.ema_span < 1 {
            return Err(StageError::Configuration(
                "EMA span must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Spatial window for the vehicle-scale derived metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalysisWindowPolicy {
    pub interval_m: f64,
    pub method: AggregateMethod,
    pub ema_span: usize,
}

impl Default for AnalysisWindowPolicy {
    fn default() -> Self {
        Self {
            interval_m: 3.0,
            method: AggregateMethod::Median,
            ema_span: 5,
        }
    }
}

impl AnalysisWindowPolicy {
    pub fn validate(&self) -> StageResult<()> {
        if !(self.interval_m > 0.0) {
            return Err(StageError::Configuration(
                "analysis interval must be positive".into(),
            ));
        }
        if self.method == AggregateMethod::Ema && self.ema_span < 1 {
            return Err(StageError::Configuration(
                "EMA span must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Per-module analysis settings: post-hoc correction plus the spatial
/// window (only meaningful for the windowed modules).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalysisOptions {
    pub correction: CorrectionFactor,
    pub window: AnalysisWindowPolicy,
}

impl AnalysisOptions {
    /// Module defaults: vehicle-scale 3 m windows, except straightness
    /// which inspects 1 m spans.
    pub fn default_for(module_id: &str) -> Self {
        let mut options = Self::default();
        if module_id == "straightness" {
            options.window.interval_m = 1.0;
        }
        options
    }
}

/// Preprocessing-side settings: one entry per pipeline stage policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PrepOptions {
    pub outlier_removal: OutlierSettings,
    pub scale_offset: CorrectionMap,
    pub aggregation: AggregationPolicy,
}

/// Settings document exchanged with the persistence collaborator. Every
/// field carries a default, so a missing or partial document loads with
/// the documented defaults instead of failing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OptionsDocument {
    pub prep: PrepOptions,
    pub analysis: BTreeMap<String, AnalysisOptions>,
}

impl OptionsDocument {
    pub fn from_json(text: &str) -> StageResult<Self> {
        serde_json::from_str(text)
            .map_err(|err| StageError::Data(format!("parsing options document: {}", err)))
    }

    pub fn to_json(&self) -> StageResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| StageError::Data(format!("serializing options document: {}", err)))
    }

    pub fn validate(&self) -> StageResult<()> {
        self.prep.outlier_removal.validate()?;
        self.prep.aggregation.validate()?;
        for options in self.analysis.values() {
            options.window.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_document_fills_defaults() {
        let doc = OptionsDocument::from_json(r#"{"prep": {"aggregation": {"method": "median"}}}"#)
            .unwrap();
        assert_eq!(doc.prep.aggregation.method, AggregateMethod::Median);
        assert_eq!(doc.prep.aggregation.window, AggregationWindow::Rows(1));
        assert_eq!(doc.prep.outlier_removal.bulk.iqr_multiplier, 1.5);
        assert_eq!(doc.prep.outlier_removal.bulk.z_score_threshold, 3.0);
        assert!(doc.prep.scale_offset.is_empty());
    }

    #[test]
    fn empty_document_is_valid() {
        let doc = OptionsDocument::from_json("{}").unwrap();
        assert!(doc.validate().is_ok());
        assert_eq!(doc.prep.aggregation.method, AggregateMethod::Mean);
    }

    #[test]
    fn document_round_trips() {
        let mut doc = OptionsDocument::default();
        doc.prep
            .scale_offset
            .set("Level1", CorrectionFactor::new(2.0, 0.5));
        doc.analysis
            .insert("planarity".into(), AnalysisOptions::default_for("planarity"));
        let text = doc.to_json().unwrap();
        assert_eq!(OptionsDocument::from_json(&text).unwrap(), doc);
    }

    #[test]
    fn aggregation_policy_rejects_bad_windows() {
        let mut policy = AggregationPolicy {
            window: AggregationWindow::Rows(0),
            ..Default::default()
        };
        assert!(policy.validate().is_err());
        policy.window = AggregationWindow::Distance(0.0);
        assert!(policy.validate().is_err());
        policy.window = AggregationWindow::Rows(4);
        policy.method = AggregateMethod::Ema;
        policy.ema_span = 0;
        assert!(policy.validate().is_err());
        policy.ema_span = 5;
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn bulk_mode_overrides_column_entries() {
        let mut settings = OutlierSettings::default();
        settings.bulk.iqr_multiplier = 2.5;
        settings
            .columns
            .insert("Level1".into(), ColumnOutlierPolicy::default());
        assert!(settings.policy_for("Level9").is_none());
        settings.apply_mode = ApplyMode::Bulk;
        assert_eq!(settings.policy_for("Level9").unwrap().iqr_multiplier, 2.5);
    }

    #[test]
    fn changed_since_reports_new_modified_and_removed() {
        let v1: CorrectionMap = [
            ("A".to_string(), CorrectionFactor::new(2.0, 0.0)),
            ("B".to_string(), CorrectionFactor::default()),
        ]
        .into_iter()
        .collect();
        let v2: CorrectionMap = [
            ("A".to_string(), CorrectionFactor::new(3.0, 0.0)),
            ("C".to_string(), CorrectionFactor::default()),
        ]
        .into_iter()
        .collect();
        let mut changed = v2.changed_since(&v1);
        changed.sort();
        assert_eq!(changed, vec!["A", "B", "C"]);
        assert!(v1.changed_since(&v1.clone()).is_empty());
    }

    #[test]
    fn straightness_defaults_use_one_meter_windows() {
        assert_eq!(AnalysisOptions::default_for("straightness").window.interval_m, 1.0);
        assert_eq!(AnalysisOptions::default_for("planarity").window.interval_m, 3.0);
    }
}
