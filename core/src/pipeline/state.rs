use std::sync::Arc;

use crate::model::{Dataset, SelectionSet};
use crate::prelude::StageStatus;
use crate::processing::MetricKind;

/// Identifier of one node in the stage graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageId {
    Raw,
    OutlierRemoved,
    Aggregated,
    Corrected,
    Derived(MetricKind),
}

impl StageId {
    /// Every stage in dependency order: recomputing the list front to back
    /// always visits a stage before its dependents.
    pub fn all() -> Vec<StageId> {
        let mut stages = vec![
            StageId::Raw,
            StageId::OutlierRemoved,
            StageId::Aggregated,
            StageId::Corrected,
        ];
        stages.extend(MetricKind::ALL.map(StageId::Derived));
        stages
    }

    pub fn upstream(&self) -> Option<StageId> {
        match self {
            StageId::Raw => None,
            StageId::OutlierRemoved => Some(StageId::Raw),
            StageId::Aggregated => Some(StageId::OutlierRemoved),
            StageId::Corrected => Some(StageId::Aggregated),
            StageId::Derived(_) => Some(StageId::Corrected),
        }
    }

    /// Transitive dependents in dependency order, excluding `self`.
    pub fn downstream(&self) -> Vec<StageId> {
        match self {
            StageId::Raw => Self::all().split_off(1),
            StageId::OutlierRemoved => Self::all().split_off(2),
            StageId::Aggregated => Self::all().split_off(3),
            StageId::Corrected => MetricKind::ALL.map(StageId::Derived).to_vec(),
            StageId::Derived(_) => Vec::new(),
        }
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageId::Raw => f.write_str("raw"),
            StageId::OutlierRemoved => f.write_str("outlier-removed"),
            StageId::Aggregated => f.write_str("aggregated"),
            StageId::Corrected => f.write_str("corrected"),
            StageId::Derived(metric) => write!(f, "derived/{}", metric),
        }
    }
}

/// Per-stage bookkeeping: staged output, gated input snapshot, row
/// selection, status, and the generation token guarding late completions.
pub struct StageState {
    output: Arc<Dataset>,
    selection: SelectionSet,
    status: StageStatus,
    generation: u64,
    input: Option<InputSnapshot>,
}

/// The gated input a stage last computed from, kept so an unchanged
/// upstream output and selection hand the stage the very same `Arc` again.
struct InputSnapshot {
    source: Arc<Dataset>,
    selection: SelectionSet,
    gated: Arc<Dataset>,
}

impl StageState {
    pub fn new() -> Self {
        Self {
            output: Arc::new(Dataset::new()),
            selection: SelectionSet::new(),
            status: StageStatus::Idle,
            generation: 0,
            input: None,
        }
    }

    pub fn output(&self) -> &Arc<Dataset> {
        &self.output
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    pub fn set_selection(&mut self, mut selection: SelectionSet) {
        selection.prune(self.output.len());
        self.selection = selection;
    }

    pub fn status(&self) -> &StageStatus {
        &self.status
    }

    /// Starts a recompute attempt and returns its generation token. A
    /// later attempt invalidates every earlier token.
    pub fn begin(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Stages a completed output. Returns `false` without touching the
    /// state when `token` was superseded by a newer attempt.
    pub fn install(
        &mut self,
        token: u64,
        output: Arc<Dataset>,
        status: StageStatus,
        preserve_selection: bool,
    ) -> bool {
        if token != self.generation {
            return false;
        }
        if preserve_selection {
            self.selection.prune(output.len());
        } else {
            self.selection = SelectionSet::all(output.len());
        }
        self.output = output;
        self.status = status;
        true
    }

    /// Marks the attempt failed while keeping the previously staged
    /// output, for worker failures. Returns `false` for stale tokens.
    pub fn fail_keeping_output(&mut self, token: u64, message: String) -> bool {
        if token != self.generation {
            return false;
        }
        self.status = StageStatus::Error(message);
        true
    }

    /// Gates `upstream` through `selection` and returns the result as a
    /// shared snapshot. The same upstream `Arc` and selection return the
    /// previously built snapshot, pointer-identical, so downstream caches
    /// keyed on input identity stay warm.
    pub fn refresh_input(
        &mut self,
        upstream: &Arc<Dataset>,
        selection: &SelectionSet,
    ) -> Arc<Dataset> {
        if let Some(snapshot) = &self.input {
            if Arc::ptr_eq(&snapshot.source, upstream) && snapshot.selection == *selection {
                return Arc::clone(&snapshot.gated);
            }
        }
        let gated = if selection.is_empty() || selection.covers_all(upstream.len()) {
            Arc::clone(upstream)
        } else {
            Arc::new(upstream.subset(selection))
        };
        self.input = Some(InputSnapshot {
            source: Arc::clone(upstream),
            selection: selection.clone(),
            gated: Arc::clone(&gated),
        });
        gated
    }
}

impl Default for StageState {
    fn default() -> Self {
        Self::new()
    }
}
