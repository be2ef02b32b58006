use ndarray::{Array1, ArrayView1, ArrayView2};

use crate::error::{Error, Result};

pub mod io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Numeric,
    Nominal { cardinality: usize },
    Binned { n_bins: usize },
}

impl AttributeKind {
    /// Number of histogram buckets for attributes stored as dense codes.
    pub fn n_buckets(&self) -> Option<usize> {
        match *self {
            AttributeKind::Numeric => None,
            AttributeKind::Nominal { cardinality } => Some(cardinality),
            AttributeKind::Binned { n_bins } => Some(n_bins),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub index: usize,
    pub name: String,
    pub kind: AttributeKind,
}

impl Attribute {
    pub fn numeric(index: usize) -> Self {
        Self {
            index,
            name: format!("x{index}"),
            kind: AttributeKind::Numeric,
        }
    }

    pub fn nominal(index: usize, cardinality: usize) -> Self {
        Self {
            index,
            name: format!("x{index}"),
            kind: AttributeKind::Nominal { cardinality },
        }
    }

    pub fn binned(index: usize, n_bins: usize) -> Self {
        Self {
            index,
            name: format!("x{index}"),
            kind: AttributeKind::Binned { n_bins },
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Read-only training view: features, targets, weights and attribute descriptors.
///
/// Nominal and binned attributes hold integral codes in `0..cardinality`. When
/// `sparse` is set, numeric columns built from these instances leave out exact
/// zeros.
#[derive(Debug, Clone)]
pub struct Instances<'a> {
    x: ArrayView2<'a, f64>,
    y: ArrayView1<'a, f64>,
    weights: Array1<f64>,
    attributes: Vec<Attribute>,
    sparse: bool,
}

impl<'a> Instances<'a> {
    /// All attributes numeric, unit weights, dense storage.
    pub fn new(x: ArrayView2<'a, f64>, y: ArrayView1<'a, f64>) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(Error::invalid(format!(
                "feature matrix has {} rows but there are {} targets",
                x.nrows(),
                y.len()
            )));
        }
        if let Some(i) = y.iter().position(|v| !v.is_finite()) {
            return Err(Error::invalid(format!("target {i} is not finite")));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(Error::invalid("feature matrix contains non-finite values"));
        }
        let attributes = (0..x.ncols()).map(Attribute::numeric).collect();
        Ok(Self {
            x,
            y,
            weights: Array1::ones(y.len()),
            attributes,
            sparse: false,
        })
    }

    pub fn with_weights(mut self, weights: ArrayView1<'_, f64>) -> Result<Self> {
        if weights.len() != self.y.len() {
            return Err(Error::invalid(format!(
                "expected {} weights, got {}",
                self.y.len(),
                weights.len()
            )));
        }
        if let Some(i) = weights.iter().position(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::invalid(format!(
                "weight {i} must be finite and non-negative"
            )));
        }
        self.weights = weights.to_owned();
        Ok(self)
    }

    pub fn with_attributes(mut self, attributes: Vec<Attribute>) -> Result<Self> {
        if attributes.len() != self.x.ncols() {
            return Err(Error::invalid(format!(
                "expected {} attributes, got {}",
                self.x.ncols(),
                attributes.len()
            )));
        }
        for (col, attribute) in attributes.iter().enumerate() {
            if attribute.index != col {
                return Err(Error::invalid(format!(
                    "attribute '{}' has index {} but describes column {col}",
                    attribute.name, attribute.index
                )));
            }
            if let Some(n_buckets) = attribute.kind.n_buckets() {
                let bad = self
                    .x
                    .column(col)
                    .iter()
                    .any(|&v| v < 0.0 || v.fract() != 0.0 || v as usize >= n_buckets);
                if bad {
                    return Err(Error::invalid(format!(
                        "attribute '{}' must hold integral codes in 0..{n_buckets}",
                        attribute.name
                    )));
                }
            }
        }
        self.attributes = attributes;
        Ok(self)
    }

    pub fn sparse(mut self, sparse: bool) -> Self {
        self.sparse = sparse;
        self
    }

    #[inline]
    pub fn x(&self) -> ArrayView2<'a, f64> {
        self.x
    }

    #[inline]
    pub fn y(&self) -> ArrayView1<'a, f64> {
        self.y
    }

    #[inline]
    pub fn weights(&self) -> ArrayView1<'_, f64> {
        self.weights.view()
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn is_sparse(&self) -> bool {
        self.sparse
    }

    pub fn n_rows(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_cols(&self) -> usize {
        self.x.ncols()
    }

    #[inline]
    pub fn value(&self, row: usize, attribute: usize) -> f64 {
        self.x[[row, attribute]]
    }
}

/// Instance holding only its nonzero features, indices ascending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseRow {
    pub indices: Vec<usize>,
    pub values: Vec<f64>,
}

impl SparseRow {
    pub fn from_dense(row: &[f64]) -> Self {
        let (indices, values) = row
            .iter()
            .enumerate()
            .filter(|(_, &v)| v != 0.0)
            .map(|(i, &v)| (i, v))
            .unzip();
        Self { indices, values }
    }

    pub fn to_dense(&self, n_features: usize) -> Vec<f64> {
        let mut row = vec![0.0; n_features];
        for (&i, &v) in self.indices.iter().zip(&self.values) {
            row[i] = v;
        }
        row
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{array, Array2};

    use super::*;

    #[test]
    fn test_row_count_mismatch_is_rejected() {
        let x = Array2::<f64>::zeros((3, 2));
        let y = array![1.0, 2.0];
        assert!(matches!(
            Instances::new(x.view(), y.view()),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_nominal_codes_are_validated() {
        let x = array![[0.0, 1.5], [2.0, 3.0]];
        let y = array![1.0, 2.0];
        let instances = Instances::new(x.view(), y.view()).unwrap();
        let res = instances.with_attributes(vec![Attribute::nominal(0, 3), Attribute::nominal(1, 4)]);
        assert!(res.is_err());
    }

    #[test]
    fn test_negative_weight_is_rejected() {
        let x = Array2::<f64>::zeros((2, 1));
        let y = array![1.0, 2.0];
        let w = array![1.0, -0.5];
        let res = Instances::new(x.view(), y.view())
            .unwrap()
            .with_weights(w.view());
        assert!(res.is_err());
    }

    #[test]
    fn test_sparse_row_round_trip() {
        let dense = vec![0.0, 1.5, 0.0, -2.0];
        let sparse = SparseRow::from_dense(&dense);
        assert_eq!(sparse.indices, vec![1, 3]);
        assert_eq!(sparse.to_dense(4), dense);
    }
}
