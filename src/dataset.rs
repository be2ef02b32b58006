//! Sorted-column partitions.
//!
//! A [`Partition`] owns a subset of the training instances together with one
//! [`FeatureColumn`] per numeric attribute: the `(local index, value)` pairs of
//! that attribute sorted ascending by value. Splitting streams every column once
//! and buckets entries into the two children, so the children stay sorted and
//! nothing is ever re-sorted after the initial build. Merging is the inverse,
//! a two-pointer merge per column.
//!
//! Local indices always refer to positions in the partition's own row list.
//! Nominal and binned attributes have no column: their codes are read straight
//! from the source matrix when histograms are built.

use itertools::Itertools;

use crate::data::{AttributeKind, Instances};
use crate::error::{Error, Result};


/// Weighted variance below this is treated as a constant target.
pub const VARIANCE_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnEntry {
    pub index: usize,
    pub value: f64,
}

/// Entries of one numeric attribute, sorted ascending by value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureColumn {
    entries: Vec<ColumnEntry>,
}

impl FeatureColumn {
    /// Sorts `(local index, value)` pairs once. Exact zeros are dropped when
    /// `skip_zeros` is set.
    pub fn from_values<I>(values: I, skip_zeros: bool) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        let mut entries: Vec<ColumnEntry> = values
            .into_iter()
            .enumerate()
            .filter(|(_, v)| !(skip_zeros && *v == 0.0))
            .map(|(index, value)| ColumnEntry { index, value })
            .collect();
        entries.sort_by(|a, b| a.value.total_cmp(&b.value));
        Self { entries }
    }

    #[inline]
    pub fn entries(&self) -> &[ColumnEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_sorted(&self) -> bool {
        self.entries.windows(2).all(|w| w[0].value <= w[1].value)
    }
}

/// Instance subset plus its sorted columns. `'s` is the borrow of the
/// source instances, `'a` the lifetime of the data they view.
#[derive(Debug, Clone)]
pub struct Partition<'s, 'a> {
    source: &'s Instances<'a>,
    rows: Vec<usize>,
    targets: Vec<f64>,
    weights: Vec<f64>,
    columns: Vec<Option<FeatureColumn>>,
}

impl<'s, 'a> Partition<'s, 'a> {
    /// Every source row with the source targets.
    pub fn new(source: &'s Instances<'a>) -> Result<Self> {
        let rows: Vec<usize> = (0..source.n_rows()).collect();
        let targets = source.y().to_vec();
        Self::from_rows(source, rows, targets)
    }

    /// Arbitrary rows of `source` (repeats allowed, as produced by bootstrap
    /// sampling) with caller-supplied targets, e.g. boosting residuals.
    pub fn from_rows(source: &'s Instances<'a>, rows: Vec<usize>, targets: Vec<f64>) -> Result<Self> {
        if rows.is_empty() {
            return Err(Error::invalid("cannot build a model from zero instances"));
        }
        if rows.len() != targets.len() {
            return Err(Error::invalid(format!(
                "{} rows but {} targets",
                rows.len(),
                targets.len()
            )));
        }
        if let Some(&row) = rows.iter().find(|&&r| r >= source.n_rows()) {
            return Err(Error::invalid(format!(
                "row {row} out of range for {} instances",
                source.n_rows()
            )));
        }
        if targets.iter().any(|t| !t.is_finite()) {
            return Err(Error::invalid("targets must be finite"));
        }

        let source_weights = source.weights();
        let weights = rows.iter().map(|&r| source_weights[r]).collect();
        let x = source.x();
        let columns = source
            .attributes()
            .iter()
            .map(|attribute| match attribute.kind {
                AttributeKind::Numeric => Some(FeatureColumn::from_values(
                    rows.iter().map(|&r| x[[r, attribute.index]]),
                    source.is_sparse(),
                )),
                _ => None,
            })
            .collect();

        Ok(Self {
            source,
            rows,
            targets,
            weights,
            columns,
        })
    }

    /// Same instances and columns with new targets, without re-sorting.
    pub fn with_targets(&self, targets: Vec<f64>) -> Result<Partition<'s, 'a>> {
        if targets.len() != self.len() {
            return Err(Error::invalid(format!(
                "{} instances but {} targets",
                self.len(),
                targets.len()
            )));
        }
        if targets.iter().any(|t| !t.is_finite()) {
            return Err(Error::invalid("targets must be finite"));
        }
        Ok(Partition {
            source: self.source,
            rows: self.rows.clone(),
            targets,
            weights: self.weights.clone(),
            columns: self.columns.clone(),
        })
    }

    pub fn source(&self) -> &'s Instances<'a> {
        self.source
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Source row of every local index.
    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    pub fn targets(&self) -> &[f64] {
        &self.targets
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn n_attributes(&self) -> usize {
        self.columns.len()
    }

    /// Sorted column of a numeric attribute, `None` for nominal/binned ones.
    pub fn column(&self, attribute: usize) -> Option<&FeatureColumn> {
        self.columns[attribute].as_ref()
    }

    #[inline]
    pub fn value(&self, local: usize, attribute: usize) -> f64 {
        self.source.value(self.rows[local], attribute)
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.iter().sum()
    }

    pub fn weighted_sum(&self) -> f64 {
        self.weights
            .iter()
            .zip(&self.targets)
            .map(|(w, t)| w * t)
            .sum()
    }

    /// Leaf prediction. A partition without weight predicts 0.
    pub fn weighted_mean(&self) -> f64 {
        let weight = self.total_weight();
        if weight < crate::histogram::WEIGHT_EPSILON {
            0.0
        } else {
            self.weighted_sum() / weight
        }
    }

    pub fn weighted_variance(&self) -> f64 {
        let weight = self.total_weight();
        if weight < crate::histogram::WEIGHT_EPSILON {
            return 0.0;
        }
        let mean = self.weighted_sum() / weight;
        self.weights
            .iter()
            .zip(&self.targets)
            .map(|(w, t)| w * (t - mean).powi(2))
            .sum::<f64>()
            / weight
    }

    pub fn has_constant_target(&self) -> bool {
        self.weighted_variance() < VARIANCE_EPSILON
    }

    /// Splits on `value <= threshold` (left) versus `value > threshold` (right).
    ///
    /// Every column is streamed once; children are numbered in parent order so
    /// the bucketed columns stay sorted. Either child may be empty.
    pub fn split(&self, attribute: usize, threshold: f64) -> (Partition<'s, 'a>, Partition<'s, 'a>) {
        let n = self.len();
        let mut goes_left = Vec::with_capacity(n);
        let mut remap = Vec::with_capacity(n);
        let (mut n_left, mut n_right) = (0, 0);
        for local in 0..n {
            if self.value(local, attribute) <= threshold {
                goes_left.push(true);
                remap.push(n_left);
                n_left += 1;
            } else {
                goes_left.push(false);
                remap.push(n_right);
                n_right += 1;
            }
        }

        let mut left = self.empty_child(n_left);
        let mut right = self.empty_child(n_right);
        for local in 0..n {
            let child = if goes_left[local] { &mut left } else { &mut right };
            child.rows.push(self.rows[local]);
            child.targets.push(self.targets[local]);
            child.weights.push(self.weights[local]);
        }

        for (attr, column) in self.columns.iter().enumerate() {
            let Some(column) = column else {
                continue;
            };
            let mut left_entries = Vec::with_capacity(n_left.min(column.len()));
            let mut right_entries = Vec::with_capacity(n_right.min(column.len()));
            for entry in column.entries() {
                let moved = ColumnEntry {
                    index: remap[entry.index],
                    value: entry.value,
                };
                if goes_left[entry.index] {
                    left_entries.push(moved);
                } else {
                    right_entries.push(moved);
                }
            }
            left.columns[attr] = Some(FeatureColumn {
                entries: left_entries,
            });
            right.columns[attr] = Some(FeatureColumn {
                entries: right_entries,
            });
        }

        (left, right)
    }

    /// Undoes a split: `left`'s instances keep their local indices, `right`'s
    /// are offset by `left.len()`.
    pub fn merge(left: Partition<'s, 'a>, right: Partition<'s, 'a>) -> Partition<'s, 'a> {
        debug_assert!(std::ptr::eq(left.source, right.source));
        let offset = left.len();

        let columns = left
            .columns
            .into_iter()
            .zip(right.columns)
            .map(|(l, r)| match (l, r) {
                (Some(l), Some(r)) => {
                    let shifted = r.entries.into_iter().map(|e| ColumnEntry {
                        index: e.index + offset,
                        value: e.value,
                    });
                    let entries = l
                        .entries
                        .into_iter()
                        .merge_by(shifted, |a, b| a.value <= b.value)
                        .collect();
                    Some(FeatureColumn { entries })
                }
                _ => None,
            })
            .collect();

        let mut rows = left.rows;
        rows.extend(right.rows);
        let mut targets = left.targets;
        targets.extend(right.targets);
        let mut weights = left.weights;
        weights.extend(right.weights);

        Partition {
            source: left.source,
            rows,
            targets,
            weights,
            columns,
        }
    }

    fn empty_child(&self, capacity: usize) -> Partition<'s, 'a> {
        Partition {
            source: self.source,
            rows: Vec::with_capacity(capacity),
            targets: Vec::with_capacity(capacity),
            weights: Vec::with_capacity(capacity),
            columns: vec![None; self.columns.len()],
        }
    }
}
