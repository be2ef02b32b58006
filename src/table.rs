use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

use crate::error::{Error, Result};
use crate::FittedModel;

pub mod fitter;
pub mod params;

pub use fitter::{build, fit, fit_instances};
pub use params::{ConstructionMode, TableParams, TableParamsBuilder, MAX_DEPTH};

/// Oblivious regression tree: one `(attribute, threshold)` rule per depth,
/// shared by every instance.
///
/// The path of an instance is a bitmask where bit `depth - d - 1` is set when the
/// depth-`d` rule holds (`value <= threshold`). Leaves are stored sparsely as two
/// parallel arrays sorted by bitmask.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionTable {
    attributes: Vec<usize>,
    thresholds: Vec<f64>,
    indices: Vec<u64>,
    predictions: Vec<f64>,
}

impl DecisionTable {
    pub fn new(
        attributes: Vec<usize>,
        thresholds: Vec<f64>,
        indices: Vec<u64>,
        predictions: Vec<f64>,
    ) -> Result<Self> {
        if attributes.len() != thresholds.len() {
            return Err(Error::invalid(format!(
                "{} attributes but {} thresholds",
                attributes.len(),
                thresholds.len()
            )));
        }
        if indices.len() != predictions.len() {
            return Err(Error::invalid(format!(
                "{} leaf indices but {} predictions",
                indices.len(),
                predictions.len()
            )));
        }
        let depth = attributes.len();
        if depth > MAX_DEPTH {
            return Err(Error::DepthTooLarge {
                depth,
                max: MAX_DEPTH,
            });
        }
        if let Some(d) = thresholds.iter().position(|t| !t.is_finite()) {
            return Err(Error::invalid(format!(
                "threshold at depth {d} is not finite: {}",
                thresholds[d]
            )));
        }
        if predictions.iter().any(|p| !p.is_finite()) {
            return Err(Error::invalid("leaf predictions must be finite"));
        }
        if !indices.windows(2).all(|w| w[0] < w[1]) {
            return Err(Error::invalid("leaf indices must be strictly ascending"));
        }
        if let Some(&last) = indices.last() {
            if last >> depth != 0 {
                return Err(Error::invalid(format!(
                    "leaf index {last} does not fit in {depth} bits"
                )));
            }
        }
        Ok(Self {
            attributes,
            thresholds,
            indices,
            predictions,
        })
    }

    pub fn depth(&self) -> usize {
        self.attributes.len()
    }

    pub fn attributes(&self) -> &[usize] {
        &self.attributes
    }

    pub fn thresholds(&self) -> &[f64] {
        &self.thresholds
    }

    /// Populated leaf bitmasks, ascending.
    pub fn indices(&self) -> &[u64] {
        &self.indices
    }

    pub fn predictions(&self) -> &[f64] {
        &self.predictions
    }

    /// Bit that the rule at `depth` sets in a path.
    #[inline]
    pub fn bit(&self, depth: usize) -> u64 {
        1 << (self.depth() - depth - 1)
    }

    pub fn path(&self, x: ArrayView1<f64>) -> u64 {
        let mut mask = 0;
        for (d, (&attribute, &threshold)) in self.attributes.iter().zip(&self.thresholds).enumerate() {
            if x[attribute] <= threshold {
                mask |= self.bit(d);
            }
        }
        mask
    }

    #[inline]
    pub fn regress(&self, x: ArrayView1<f64>) -> f64 {
        self.regress_by_bitmask(self.path(x))
    }

    /// Prediction of a leaf path; paths no training instance reached predict 0.
    #[inline]
    pub fn regress_by_bitmask(&self, mask: u64) -> f64 {
        match self.indices.binary_search(&mask) {
            Ok(i) => self.predictions[i],
            Err(_) => 0.0,
        }
    }

    /// Multiplies every leaf prediction, e.g. by a boosting learning rate.
    pub fn scale(&mut self, factor: f64) {
        self.predictions.iter_mut().for_each(|p| *p *= factor);
    }
}

impl FittedModel for DecisionTable {
    fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.axis_iter(Axis(0)).map(|row| self.regress(row)).collect()
    }
}
