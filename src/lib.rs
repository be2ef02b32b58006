pub mod data;
pub mod dataset;
pub mod ensemble;
pub mod error;
pub mod forest;
pub mod histogram;
pub mod logger;
pub mod persist;
pub mod table;
pub mod test_data;
pub mod tree;

use ndarray::{Array1, ArrayView1, ArrayView2};

pub use error::{Error, Result};

#[derive(Debug)]
pub struct FitResult {
    pub err: f64,
    pub residuals: Array1<f64>,
    pub y_hat: Array1<f64>,
}

impl FitResult {
    /// Training error and residuals of in-sample predictions.
    pub fn from_predictions(y: ArrayView1<f64>, y_hat: Array1<f64>) -> Self {
        let residuals = &y - &y_hat;
        let err = residuals.pow2().mean().unwrap_or(0.0);
        Self {
            err,
            residuals,
            y_hat,
        }
    }
}

pub trait FittedModel {
    fn predict(&self, x: ArrayView2<f64>) -> Array1<f64>;
}
