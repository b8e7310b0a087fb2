use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// User-curated subset of a stage's rows forwarded to the next stage.
///
/// Stored apart from the dataset itself and never serialized into row
/// records. An empty set means "no gating": the full dataset flows on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionSet {
    rows: BTreeSet<usize>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selection covering every row of a dataset of `len` rows.
    pub fn all(len: usize) -> Self {
        Self {
            rows: (0..len).collect(),
        }
    }

    pub fn from_rows<I: IntoIterator<Item = usize>>(rows: I) -> Self {
        Self {
            rows: rows.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, row: usize) -> bool {
        self.rows.contains(&row)
    }

    pub fn insert(&mut self, row: usize) {
        self.rows.insert(row);
    }

    pub fn remove(&mut self, row: usize) {
        self.rows.remove(&row);
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.rows.iter().copied()
    }

    /// Drops indices that fall outside a regenerated dataset of `len` rows.
    pub fn prune(&mut self, len: usize) {
        self.rows.retain(|&row| row < len);
    }

    /// True when every row of a dataset of `len` rows is selected.
    pub fn covers_all(&self, len: usize) -> bool {
        self.rows.len() == len
            && self
                .rows
                .iter()
                .next_back()
                .map_or(true, |&last| last < len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_covers_full_range() {
        let selection = SelectionSet::all(4);
        assert_eq!(selection.len(), 4);
        assert!(selection.covers_all(4));
        assert!(!selection.covers_all(5));
    }

    #[test]
    fn prune_drops_stale_indices() {
        let mut selection = SelectionSet::from_rows([0, 3, 9]);
        selection.prune(4);
        assert_eq!(selection.iter().collect::<Vec<_>>(), vec![0, 3]);
    }

    #[test]
    fn partial_selection_never_covers_all() {
        let selection = SelectionSet::from_rows([0, 2]);
        assert!(!selection.covers_all(3));
    }
}
