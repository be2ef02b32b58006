use std::time::Instant;

use ndarray::{s, ArrayView1};
use rand::{rngs::StdRng, SeedableRng};

use tabletree::{
    data::io::read_csv,
    ensemble::{boosted, BoostedTablesParamsBuilder},
    forest::{fit_bagged, ForestParamsBuilder},
    logger::Verbosity,
    table::{self, ConstructionMode, TableParamsBuilder},
    test_data::friedman,
    tree::{self, GrowthPolicy, TreeParamsBuilder},
    FitResult, FittedModel, Result,
};

fn mse(y: ArrayView1<f64>, y_hat: ArrayView1<f64>) -> f64 {
    (&y - &y_hat).pow2().mean().unwrap_or(0.0)
}

fn report(name: &str, start: Instant, fit_result: &FitResult, test_err: f64) {
    println!(
        "{name:<16} train {:>10.4}  test {:>10.4}  ({:?})",
        fit_result.err,
        test_err,
        start.elapsed()
    );
}

/// Usage: `tabletree [data.csv [target_column]]`. Without a file, fits on
/// synthetic Friedman #1 data.
fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let (x, y) = match args.next() {
        Some(path) => {
            let target = args.next().and_then(|t| t.parse().ok()).unwrap_or(0);
            let (x, y, names) = read_csv(&path, target)?;
            println!("Loaded {} rows, features {:?}", y.len(), names);
            (x, y)
        }
        None => friedman(2000, 42),
    };

    let n = y.len();
    println!("Fitting on {} samples, testing on {}", n / 2, n - n / 2);
    let x_train = x.slice(s![..n / 2, ..]);
    let y_train = y.slice(s![..n / 2]);
    let x_test = x.slice(s![n / 2.., ..]);
    let y_test = y.slice(s![n / 2..]);

    let mean = y_train.mean().unwrap_or(0.0);
    let base_err = y_test.mapv(|v| (v - mean).powi(2)).mean().unwrap_or(0.0);
    println!("{:<16} test {:>10.4}", "mean", base_err);

    let mut rng = StdRng::seed_from_u64(42);

    let start = Instant::now();
    let tree_params = TreeParamsBuilder::new()
        .policy(GrowthPolicy::NumLeavesLimited { max_leaves: 32 })
        .verbosity(Verbosity::Warning)
        .build();
    let (fr, model) = tree::fit(x_train, y_train, &tree_params, &mut rng)?;
    report("tree", start, &fr, mse(y_test, model.predict(x_test).view()));

    let start = Instant::now();
    let table_params = TableParamsBuilder::new()
        .depth(6)
        .mode(ConstructionMode::MultiPass)
        .n_passes(3)
        .verbosity(Verbosity::Warning)
        .build();
    let (fr, model) = table::fit(x_train, y_train, &table_params, &mut rng)?;
    report("table", start, &fr, mse(y_test, model.predict(x_test).view()));

    let start = Instant::now();
    let boosted_params = BoostedTablesParamsBuilder::new()
        .n_tables(200)
        .learning_rate(0.1)
        .table_params(TableParamsBuilder::new().depth(4).build())
        .build();
    let (fr, model) = boosted::fit(x_train, y_train, &boosted_params, &mut rng)?;
    report("boosted tables", start, &fr, mse(y_test, model.predict(x_test).view()));

    let start = Instant::now();
    let forest_params = ForestParamsBuilder::new().n_trees(100).build();
    let (fr, model) = fit_bagged(x_train, y_train, &forest_params, &mut rng)?;
    report("random forest", start, &fr, mse(y_test, model.predict(x_test).view()));

    Ok(())
}
