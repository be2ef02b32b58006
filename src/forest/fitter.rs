use ndarray::{ArrayView1, ArrayView2};
use rand::{rngs::StdRng, Rng, SeedableRng};

#[cfg(feature = "use-rayon")]
use rayon::prelude::*;

use crate::data::Instances;
use crate::dataset::Partition;
use crate::error::Result;
use crate::logger::TrainingLogger;
use crate::tree::{self, RegressionTree};
use crate::{FitResult, FittedModel};

use super::{params::ForestParams, RandomForest};

pub fn fit_bagged<'a, R: Rng + ?Sized>(
    x: ArrayView2<'a, f64>,
    y: ArrayView1<'a, f64>,
    hyperparameters: &ForestParams,
    rng: &mut R,
) -> Result<(FitResult, RandomForest)> {
    let instances = Instances::new(x, y)?;
    fit_bagged_instances(&instances, hyperparameters, rng)
}

/// Fits every tree on its own bootstrap sample. Each member gets a seed drawn
/// from `rng` up front, so the result does not depend on scheduling.
pub fn fit_bagged_instances<R: Rng + ?Sized>(
    instances: &Instances<'_>,
    hyperparameters: &ForestParams,
    rng: &mut R,
) -> Result<(FitResult, RandomForest)> {
    hyperparameters.validate()?;
    let logger = TrainingLogger::new(hyperparameters.verbosity);
    let n = instances.n_rows();
    logger.info(format_args!(
        "bagging {} trees on {n} instances",
        hyperparameters.n_trees
    ));

    let seeds: Vec<u64> = (0..hyperparameters.n_trees).map(|_| rng.gen()).collect();
    let seeds_iter;

    #[cfg(not(feature = "use-rayon"))]
    {
        seeds_iter = seeds.into_iter()
    }
    #[cfg(feature = "use-rayon")]
    {
        seeds_iter = seeds.into_par_iter()
    }

    let trees: Vec<RegressionTree> = seeds_iter
        .map(|seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            let rows: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            let targets = rows.iter().map(|&r| instances.y()[r]).collect();
            let partition = Partition::from_rows(instances, rows, targets)?;
            tree::build(partition, &hyperparameters.tree_params, &mut rng)
        })
        .collect::<Result<_>>()?;

    let forest = RandomForest::new(trees);
    let y_hat = forest.predict(instances.x());
    let fit_result = FitResult::from_predictions(instances.y(), y_hat);
    logger.info(format_args!("forest done: train mse {:.6}", fit_result.err));
    Ok((fit_result, forest))
}
