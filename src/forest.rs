use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

use crate::tree::RegressionTree;
use crate::FittedModel;

pub mod fitter;
pub mod params;

pub use fitter::{fit_bagged, fit_bagged_instances};
pub use params::{ForestParams, ForestParamsBuilder};

/// Bagged regression trees; predicts the average of its members.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomForest {
    trees: Vec<RegressionTree>,
}

impl RandomForest {
    pub fn new(trees: Vec<RegressionTree>) -> Self {
        Self { trees }
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    pub fn regress(&self, x: ArrayView1<f64>) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|t| t.regress(x)).sum::<f64>() / self.trees.len() as f64
    }
}

impl FittedModel for RandomForest {
    fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.axis_iter(Axis(0)).map(|row| self.regress(row)).collect()
    }
}
