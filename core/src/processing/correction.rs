use std::sync::Arc;

use crate::model::{CorrectionFactor, CorrectionMap, Dataset};
use crate::prelude::StageResult;
use crate::telemetry::LogManager;

/// Incremental scale-offset correction.
///
/// `corrected = raw * scaler + offset` per mapped column; unmapped columns
/// pass through and the identity columns are never touched. The engine is
/// constructed per pipeline instance and keeps the prior map, output, and
/// input reference so a factor edit only recomputes the columns whose
/// factor actually changed, always from the original input values and never
/// from the previous output, so repeated edits cannot compound.
pub struct CorrectionEngine {
    cache: Option<CorrectionCache>,
    logger: LogManager,
}

struct CorrectionCache {
    map: CorrectionMap,
    input: Arc<Dataset>,
    output: Arc<Dataset>,
}

impl CorrectionEngine {
    pub fn new() -> Self {
        Self {
            cache: None,
            logger: LogManager::new(),
        }
    }

    pub fn apply(&mut self, input: &Arc<Dataset>, map: &CorrectionMap) -> StageResult<Arc<Dataset>> {
        if input.is_empty() {
            // The next non-empty input must take the full path.
            self.cache = None;
            return Ok(Arc::new(input.empty_schema()));
        }

        if let Some(cache) = &self.cache {
            if Arc::ptr_eq(&cache.input, input) {
                let changed = map.changed_since(&cache.map);
                if changed.is_empty() {
                    return Ok(Arc::clone(&cache.output));
                }
                let mut output = (*cache.output).clone();
                for column in &changed {
                    Self::correct_column(input, &mut output, column, map.get(column))?;
                }
                self.logger.record(&format!(
                    "correction recomputed {} changed columns over {} rows",
                    changed.len(),
                    input.len()
                ));
                let output = Arc::new(output);
                self.cache = Some(CorrectionCache {
                    map: map.clone(),
                    input: Arc::clone(input),
                    output: Arc::clone(&output),
                });
                return Ok(output);
            }
        }

        // Full pass: new input snapshot or no cache yet.
        let mut output = (**input).clone();
        let columns: Vec<String> = map.columns().map(str::to_string).collect();
        for column in &columns {
            Self::correct_column(input, &mut output, column, map.get(column))?;
        }
        self.logger.record(&format!(
            "correction full pass over {} columns, {} rows",
            columns.len(),
            input.len()
        ));
        let output = Arc::new(output);
        self.cache = Some(CorrectionCache {
            map: map.clone(),
            input: Arc::clone(input),
            output: Arc::clone(&output),
        });
        Ok(output)
    }

    fn correct_column(
        input: &Dataset,
        output: &mut Dataset,
        column: &str,
        factor: Option<CorrectionFactor>,
    ) -> StageResult<()> {
        // Columns absent from the input pass through; a column dropped from
        // the map reverts to the raw values via the identity factor.
        let Some(raw) = input.channel(column) else {
            return Ok(());
        };
        let factor = factor.unwrap_or_default();
        let corrected = raw
            .iter()
            .map(|value| value.map(|v| factor.apply(v)))
            .collect();
        output.set_channel(column, corrected)
    }

    /// Drops the cache; the next run performs a full pass.
    pub fn invalidate(&mut self) {
        self.cache = None;
    }
}

impl Default for CorrectionEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> Arc<Dataset> {
        let mut data = Dataset::new();
        data.push_row(1, 0.0, &[("A", Some(5.0)), ("B", Some(1.0))]);
        data.push_row(2, 1.0, &[("A", Some(7.0)), ("B", Some(2.0))]);
        data.push_row(3, 2.0, &[("A", None), ("B", Some(3.0))]);
        Arc::new(data)
    }

    fn map_of(entries: &[(&str, f64, f64)]) -> CorrectionMap {
        entries
            .iter()
            .map(|&(column, scaler, offset)| {
                (column.to_string(), CorrectionFactor::new(scaler, offset))
            })
            .collect()
    }

    #[test]
    fn identity_map_returns_input_unchanged() {
        let input = dataset();
        let mut engine = CorrectionEngine::new();
        let output = engine
            .apply(&input, &map_of(&[("A", 1.0, 0.0), ("B", 1.0, 0.0)]))
            .unwrap();
        assert_eq!(*output, *input);
    }

    #[test]
    fn factor_edits_recompute_from_raw_values() {
        let input = dataset();
        let mut engine = CorrectionEngine::new();
        let v1 = engine.apply(&input, &map_of(&[("A", 2.0, 0.0)])).unwrap();
        assert_eq!(v1.channel("A").unwrap()[0], Some(10.0));

        // 5 * 3 = 15, not 10 * 3: no compounding across edits.
        let v2 = engine.apply(&input, &map_of(&[("A", 3.0, 0.0)])).unwrap();
        assert_eq!(v2.channel("A").unwrap()[0], Some(15.0));
        assert_eq!(v2.channel("A").unwrap()[2], None);
    }

    #[test]
    fn unchanged_map_returns_cached_output() {
        let input = dataset();
        let map = map_of(&[("A", 2.0, 1.0)]);
        let mut engine = CorrectionEngine::new();
        let first = engine.apply(&input, &map).unwrap();
        let second = engine.apply(&input, &map).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn incremental_path_matches_full_recompute() {
        let input = dataset();
        let v1 = map_of(&[("A", 2.0, 0.5), ("B", 1.0, 1.0)]);
        let v2 = map_of(&[("A", 4.0, -1.0), ("B", 1.0, 1.0)]);

        let mut incremental = CorrectionEngine::new();
        incremental.apply(&input, &v1).unwrap();
        let via_cache = incremental.apply(&input, &v2).unwrap();

        let mut fresh = CorrectionEngine::new();
        let from_scratch = fresh.apply(&input, &v2).unwrap();
        assert_eq!(*via_cache, *from_scratch);
    }

    #[test]
    fn removed_column_reverts_to_raw() {
        let input = dataset();
        let mut engine = CorrectionEngine::new();
        engine.apply(&input, &map_of(&[("B", 10.0, 0.0)])).unwrap();
        let output = engine.apply(&input, &CorrectionMap::new()).unwrap();
        assert_eq!(output.channel("B").unwrap(), input.channel("B").unwrap());
    }

    #[test]
    fn new_input_snapshot_forces_full_pass() {
        let first = dataset();
        let map = map_of(&[("A", 2.0, 0.0)]);
        let mut engine = CorrectionEngine::new();
        engine.apply(&first, &map).unwrap();

        let mut replacement = (*first).clone();
        replacement
            .set_channel("A", vec![Some(100.0), Some(200.0), Some(300.0)])
            .unwrap();
        let replacement = Arc::new(replacement);
        let output = engine.apply(&replacement, &map).unwrap();
        assert_eq!(output.channel("A").unwrap()[0], Some(200.0));
    }

    #[test]
    fn empty_input_empties_output_and_invalidates_cache() {
        let input = dataset();
        let map = map_of(&[("A", 2.0, 0.0)]);
        let mut engine = CorrectionEngine::new();
        let cached = engine.apply(&input, &map).unwrap();

        let empty = Arc::new(input.empty_schema());
        let output = engine.apply(&empty, &map).unwrap();
        assert!(output.is_empty());

        // Cache was dropped: the same input yields a fresh full pass.
        let recomputed = engine.apply(&input, &map).unwrap();
        assert!(!Arc::ptr_eq(&cached, &recomputed));
        assert_eq!(*cached, *recomputed);
    }

    #[test]
    fn unmapped_columns_pass_through() {
        let input = dataset();
        let mut engine = CorrectionEngine::new();
        let output = engine.apply(&input, &map_of(&[("A", 2.0, 0.0)])).unwrap();
        assert_eq!(output.channel("B").unwrap(), input.channel("B").unwrap());
        assert_eq!(output.travelled(), input.travelled());
        assert_eq!(output.index(), input.index());
    }
}
