//! Synthetic fixtures shared by unit tests, integration tests, benches and the demo.

use ndarray::{array, Array1, Array2};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::table::DecisionTable;

/// Eight instances, one feature: values {0,1,2,3} have target 0, {10,11,12,13} target 1.
pub fn step_data() -> (Array2<f64>, Array1<f64>) {
    let x = array![[0.0], [1.0], [2.0], [3.0], [10.0], [11.0], [12.0], [13.0]];
    let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
    (x, y)
}

/// Friedman #1 on five uniform features with a little uniform noise.
pub fn friedman(n: usize, seed: u64) -> (Array2<f64>, Array1<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let x = Array2::from_shape_fn((n, 5), |_| rng.gen::<f64>());
    let y = Array1::from_shape_fn(n, |i| {
        let r = x.row(i);
        10.0 * (std::f64::consts::PI * r[0] * r[1]).sin()
            + 20.0 * (r[2] - 0.5).powi(2)
            + 10.0 * r[3]
            + 5.0 * r[4]
            + rng.gen_range(-0.5..0.5)
    });
    (x, y)
}

/// Mostly-zero features: each entry is nonzero with probability `density`.
pub fn sparse_data(n: usize, p: usize, density: f64, seed: u64) -> (Array2<f64>, Array1<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let x = Array2::from_shape_fn((n, p), |_| {
        if rng.gen_bool(density) {
            rng.gen_range(-2.0..2.0)
        } else {
            0.0
        }
    });
    let y = Array1::from_shape_fn(n, |i| {
        let r = x.row(i);
        r.iter().enumerate().map(|(j, v)| v * (j % 3) as f64).sum::<f64>()
            + rng.gen_range(-0.1..0.1)
    });
    (x, y)
}

/// Tables with random rules, thresholds on a coarse grid so ties and repeated
/// features occur, and a random subset of populated leaves.
pub fn random_tables(
    n_tables: usize,
    n_features: usize,
    max_depth: usize,
    seed: u64,
) -> Vec<DecisionTable> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n_tables)
        .map(|_| {
            let depth = rng.gen_range(0..=max_depth);
            let attributes: Vec<usize> = (0..depth).map(|_| rng.gen_range(0..n_features)).collect();
            let thresholds: Vec<f64> = (0..depth)
                .map(|_| rng.gen_range(-4..=4) as f64 * 0.5)
                .collect();
            let (indices, predictions): (Vec<u64>, Vec<f64>) = (0..1u64 << depth)
                .filter_map(|mask| rng.gen_bool(0.8).then(|| (mask, rng.gen_range(-1.0..1.0))))
                .unzip();
            DecisionTable::new(attributes, thresholds, indices, predictions)
                .expect("generated tables are well formed")
        })
        .collect()
}
