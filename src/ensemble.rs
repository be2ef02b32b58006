//! Fast scoring of decision-table ensembles.
//!
//! Scoring tables one by one touches every rule of every table. The
//! [`EnsembleScoringIndex`] instead groups all rules by feature, sorted by
//! threshold descending, so an instance is scored with one scan per feature:
//! the rules whose threshold is `>= x[f]` form a prefix of that feature's list,
//! and each of them sets one bit in the path of its table.

use std::collections::BTreeMap;

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

use crate::data::SparseRow;
use crate::table::DecisionTable;
use crate::FittedModel;

pub mod boosted;

pub use boosted::{BoostedTablesParams, BoostedTablesParamsBuilder};

#[derive(Debug, Clone, Copy, PartialEq)]
struct IndexEntry {
    threshold: f64,
    table: usize,
    bit: u64,
}

#[derive(Debug, Clone)]
pub struct EnsembleScoringIndex {
    tables: Vec<DecisionTable>,
    /// Rules per used feature, features ascending, thresholds descending.
    features: Vec<(usize, Vec<IndexEntry>)>,
    /// Path of every table for the all-zero instance.
    zero_paths: Vec<u64>,
}

impl EnsembleScoringIndex {
    pub fn build(tables: Vec<DecisionTable>) -> Self {
        let mut by_feature: BTreeMap<usize, Vec<IndexEntry>> = BTreeMap::new();
        for (table_id, table) in tables.iter().enumerate() {
            for (d, (&attribute, &threshold)) in
                table.attributes().iter().zip(table.thresholds()).enumerate()
            {
                by_feature.entry(attribute).or_default().push(IndexEntry {
                    threshold,
                    table: table_id,
                    bit: table.bit(d),
                });
            }
        }
        let mut features: Vec<(usize, Vec<IndexEntry>)> = by_feature.into_iter().collect();
        for (_, entries) in &mut features {
            entries.sort_by(|a, b| b.threshold.total_cmp(&a.threshold));
        }

        let mut zero_paths = vec![0; tables.len()];
        for entry in features.iter().flat_map(|(_, entries)| entries) {
            if entry.threshold >= 0.0 {
                zero_paths[entry.table] |= entry.bit;
            }
        }

        Self {
            tables,
            features,
            zero_paths,
        }
    }

    pub fn tables(&self) -> &[DecisionTable] {
        &self.tables
    }

    /// Minimum row length for dense scoring: one past the highest feature used.
    pub fn n_features(&self) -> usize {
        self.features.last().map_or(0, |(f, _)| f.saturating_add(1))
    }

    /// Features some rule tests, ascending.
    pub fn used_features(&self) -> impl Iterator<Item = usize> + '_ {
        self.features.iter().map(|(f, _)| *f)
    }

    /// Sum of all table predictions for a dense instance.
    pub fn regress(&self, x: ArrayView1<f64>) -> f64 {
        let mut paths = vec![0u64; self.tables.len()];
        for (f, entries) in &self.features {
            let value = x[*f];
            for entry in entries {
                if entry.threshold < value || value.is_nan() {
                    break;
                }
                paths[entry.table] |= entry.bit;
            }
        }
        self.sum_paths(&paths)
    }

    /// Sum of all table predictions for an instance given by its nonzero
    /// features. Starts from the all-zero paths and only revisits the rules
    /// whose outcome differs between 0 and the actual value.
    pub fn regress_sparse(&self, row: &SparseRow) -> f64 {
        let mut paths = self.zero_paths.clone();
        for (f, value) in row.iter() {
            let Ok(slot) = self.features.binary_search_by_key(&f, |(g, _)| *g) else {
                continue;
            };
            let entries = &self.features[slot].1;
            if value > 0.0 {
                // rules with threshold in [0, value) flip from true to false
                let start = entries.partition_point(|e| e.threshold >= value);
                for entry in entries[start..].iter().take_while(|e| e.threshold >= 0.0) {
                    paths[entry.table] &= !entry.bit;
                }
            } else if value < 0.0 {
                // rules with threshold in [value, 0) flip from false to true
                let start = entries.partition_point(|e| e.threshold >= 0.0);
                for entry in entries[start..].iter().take_while(|e| e.threshold >= value) {
                    paths[entry.table] |= entry.bit;
                }
            }
        }
        self.sum_paths(&paths)
    }

    fn sum_paths(&self, paths: &[u64]) -> f64 {
        self.tables
            .iter()
            .zip(paths)
            .map(|(table, &mask)| table.regress_by_bitmask(mask))
            .sum()
    }
}

impl FittedModel for EnsembleScoringIndex {
    fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.axis_iter(Axis(0)).map(|row| self.regress(row)).collect()
    }
}

/// Additive ensemble of decision tables, scored through an [`EnsembleScoringIndex`].
#[derive(Debug, Clone)]
pub struct TableEnsemble {
    index: EnsembleScoringIndex,
}

impl TableEnsemble {
    pub fn new(tables: Vec<DecisionTable>) -> Self {
        Self {
            index: EnsembleScoringIndex::build(tables),
        }
    }

    pub fn tables(&self) -> &[DecisionTable] {
        self.index.tables()
    }

    pub fn index(&self) -> &EnsembleScoringIndex {
        &self.index
    }

    pub fn regress(&self, x: ArrayView1<f64>) -> f64 {
        self.index.regress(x)
    }

    pub fn regress_sparse(&self, row: &SparseRow) -> f64 {
        self.index.regress_sparse(row)
    }
}

impl FittedModel for TableEnsemble {
    fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        self.index.predict(x)
    }
}

impl PartialEq for TableEnsemble {
    fn eq(&self, other: &Self) -> bool {
        self.tables() == other.tables()
    }
}
