use ndarray::{ArrayView1, ArrayView2};
use rand::Rng;

use crate::data::Instances;
use crate::dataset::Partition;
use crate::error::{Error, Result};
use crate::logger::{TrainingLogger, Verbosity};
use crate::table::{self, DecisionTable, TableParams};
use crate::{FitResult, FittedModel};

use super::TableEnsemble;

#[derive(Debug, Clone)]
pub struct BoostedTablesParams {
    pub n_tables: usize,
    pub learning_rate: f64,
    pub table_params: TableParams,
    pub verbosity: Verbosity,
}

impl BoostedTablesParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(Error::invalid(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        self.table_params.validate()
    }
}

// Builder for BoostedTablesParams
#[derive(Debug, Clone)]
pub struct BoostedTablesParamsBuilder {
    n_tables: usize,
    learning_rate: f64,
    table_params: TableParams,
    verbosity: Verbosity,
}

impl BoostedTablesParamsBuilder {
    pub fn new() -> Self {
        Self {
            n_tables: 100,
            learning_rate: 0.1,
            table_params: TableParams::default(),
            verbosity: Verbosity::Silent,
        }
    }

    pub fn n_tables(mut self, n_tables: usize) -> Self {
        self.n_tables = n_tables;
        self
    }

    pub fn learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn table_params(mut self, table_params: TableParams) -> Self {
        self.table_params = table_params;
        self
    }

    pub fn verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn build(self) -> BoostedTablesParams {
        BoostedTablesParams {
            n_tables: self.n_tables,
            learning_rate: self.learning_rate,
            table_params: self.table_params,
            verbosity: self.verbosity,
        }
    }
}

impl Default for BoostedTablesParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for BoostedTablesParams {
    fn default() -> Self {
        BoostedTablesParamsBuilder::new().build()
    }
}

pub fn fit<'a, R: Rng + ?Sized>(
    x: ArrayView2<'a, f64>,
    y: ArrayView1<'a, f64>,
    hyperparameters: &BoostedTablesParams,
    rng: &mut R,
) -> Result<(FitResult, TableEnsemble)> {
    let instances = Instances::new(x, y)?;
    fit_instances(&instances, hyperparameters, rng)
}

/// Stagewise boosting: a depth-0 table holding the weighted mean, then
/// `n_tables` tables each fitted to the current residuals and shrunk by
/// `learning_rate`.
pub fn fit_instances<R: Rng + ?Sized>(
    instances: &Instances<'_>,
    hyperparameters: &BoostedTablesParams,
    rng: &mut R,
) -> Result<(FitResult, TableEnsemble)> {
    hyperparameters.validate()?;
    let logger = TrainingLogger::new(hyperparameters.verbosity);
    logger.info(format_args!(
        "boosting {} depth-{} tables on {} instances",
        hyperparameters.n_tables,
        hyperparameters.table_params.depth,
        instances.n_rows()
    ));

    let base = Partition::new(instances)?;
    let bias = base.weighted_mean();
    let mut tables = Vec::with_capacity(hyperparameters.n_tables + 1);
    tables.push(DecisionTable::new(Vec::new(), Vec::new(), vec![0], vec![bias])?);

    let mut residuals = instances.y().mapv(|y| y - bias);
    for round in 0..hyperparameters.n_tables {
        let partition = base.with_targets(residuals.to_vec())?;
        let mut table = table::build(partition, &hyperparameters.table_params, rng)?;
        table.scale(hyperparameters.learning_rate);
        residuals -= &table.predict(instances.x());
        tables.push(table);
        if logger.enabled(Verbosity::Info) {
            logger.log_round(round, residuals.pow2().mean().unwrap_or(0.0));
        }
    }

    let ensemble = TableEnsemble::new(tables);
    let y_hat = ensemble.predict(instances.x());
    Ok((FitResult::from_predictions(instances.y(), y_hat), ensemble))
}
