use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::selection::SelectionSet;
use crate::prelude::{StageError, StageResult};

/// Columnar snapshot of position-indexed sensor readings.
///
/// Rows carry an ordinal `index`, a non-decreasing spatial coordinate
/// `travelled` (meters), named numeric channels (`None` marks an undefined
/// reading), and auxiliary string columns that no engine transforms.
/// Stages exchange datasets as immutable snapshots; a stage never mutates
/// its upstream data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    index: Vec<u64>,
    travelled: Vec<f64>,
    channels: BTreeMap<String, Vec<Option<f64>>>,
    aux: BTreeMap<String, Vec<String>>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a dataset from pre-assembled identity columns. Channels are
    /// attached afterwards with [`Dataset::set_channel`].
    pub fn from_parts(index: Vec<u64>, travelled: Vec<f64>) -> StageResult<Self> {
        if index.len() != travelled.len() {
            return Err(StageError::Data(format!(
                "index has {} rows but travelled has {}",
                index.len(),
                travelled.len()
            )));
        }
        Ok(Self {
            index,
            travelled,
            channels: BTreeMap::new(),
            aux: BTreeMap::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &[u64] {
        &self.index
    }

    pub fn travelled(&self) -> &[f64] {
        &self.travelled
    }

    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    pub fn channel(&self, name: &str) -> Option<&[Option<f64>]> {
        self.channels.get(name).map(Vec::as_slice)
    }

    pub fn aux_names(&self) -> impl Iterator<Item = &str> {
        self.aux.keys().map(String::as_str)
    }

    pub fn aux(&self, name: &str) -> Option<&[String]> {
        self.aux.get(name).map(Vec::as_slice)
    }

    /// Appends one row. Channels missing from `values` are padded with
    /// `None`; a channel first seen here is back-filled for earlier rows.
    pub fn push_row(&mut self, index: u64, travelled: f64, values: &[(&str, Option<f64>)]) {
        let prior_len = self.index.len();
        self.index.push(index);
        self.travelled.push(travelled);
        for (name, value) in values {
            self.channels
                .entry((*name).to_string())
                .or_insert_with(|| vec![None; prior_len])
                .push(*value);
        }
        let len = self.index.len();
        for column in self.channels.values_mut() {
            if column.len() < len {
                column.push(None);
            }
        }
        for column in self.aux.values_mut() {
            if column.len() < len {
                column.push(String::new());
            }
        }
    }

    /// Replaces a whole channel column; the length must match the row count.
    pub fn set_channel(&mut self, name: &str, values: Vec<Option<f64>>) -> StageResult<()> {
        if values.len() != self.len() {
            return Err(StageError::Data(format!(
                "channel {} carries {} values for {} rows",
                name,
                values.len(),
                self.len()
            )));
        }
        self.channels.insert(name.to_string(), values);
        Ok(())
    }

    pub fn set_aux(&mut self, name: &str, values: Vec<String>) -> StageResult<()> {
        if values.len() != self.len() {
            return Err(StageError::Data(format!(
                "aux column {} carries {} values for {} rows",
                name,
                values.len(),
                self.len()
            )));
        }
        self.aux.insert(name.to_string(), values);
        Ok(())
    }

    /// Zero-row copy preserving the column set, used for stages that failed
    /// or received no rows.
    pub fn empty_schema(&self) -> Dataset {
        let mut data = Dataset::default();
        for name in self.channels.keys() {
            data.channels.insert(name.clone(), Vec::new());
        }
        for name in self.aux.keys() {
            data.aux.insert(name.clone(), Vec::new());
        }
        data
    }

    /// Rows referenced by `selection`, ascending; out-of-range indices are
    /// ignored.
    pub fn subset(&self, selection: &SelectionSet) -> Dataset {
        let rows: Vec<usize> = selection.iter().filter(|&row| row < self.len()).collect();
        let mut out = Dataset {
            index: rows.iter().map(|&row| self.index[row]).collect(),
            travelled: rows.iter().map(|&row| self.travelled[row]).collect(),
            channels: BTreeMap::new(),
            aux: BTreeMap::new(),
        };
        for (name, column) in &self.channels {
            out.channels
                .insert(name.clone(), rows.iter().map(|&row| column[row]).collect());
        }
        for (name, column) in &self.aux {
            out.aux.insert(
                name.clone(),
                rows.iter().map(|&row| column[row].clone()).collect(),
            );
        }
        out
    }

    /// Ingestion-side sanity checks: ascending `travelled` and aligned
    /// column lengths.
    pub fn validate(&self) -> StageResult<()> {
        for pair in self.travelled.windows(2) {
            if pair[1] < pair[0] {
                return Err(StageError::Data("travelled must be non-decreasing".into()));
            }
        }
        let len = self.len();
        for (name, column) in &self.channels {
            if column.len() != len {
                return Err(StageError::Data(format!("channel {} length mismatch", name)));
            }
        }
        for (name, column) in &self.aux {
            if column.len() != len {
                return Err(StageError::Data(format!(
                    "aux column {} length mismatch",
                    name
                )));
            }
        }
        Ok(())
    }
}
