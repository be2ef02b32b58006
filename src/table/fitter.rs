use std::collections::BTreeMap;

use ndarray::{ArrayView1, ArrayView2};
use rand::Rng;

use crate::data::Instances;
use crate::dataset::Partition;
use crate::error::{Error, Result};
use crate::histogram::{scan_summed, BestSplits};
use crate::logger::TrainingLogger;
use crate::{FitResult, FittedModel};

use super::params::{ConstructionMode, TableParams};
use super::DecisionTable;

/// Active partitions keyed by path bitmask, iterated in ascending bitmask order.
type PartitionMap<'s, 'a> = BTreeMap<u64, Partition<'s, 'a>>;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Rule {
    attribute: usize,
    threshold: f64,
}

pub fn fit<'a, R: Rng + ?Sized>(
    x: ArrayView2<'a, f64>,
    y: ArrayView1<'a, f64>,
    hyperparameters: &TableParams,
    rng: &mut R,
) -> Result<(FitResult, DecisionTable)> {
    let instances = Instances::new(x, y)?;
    fit_instances(&instances, hyperparameters, rng)
}

pub fn fit_instances<R: Rng + ?Sized>(
    instances: &Instances<'_>,
    hyperparameters: &TableParams,
    rng: &mut R,
) -> Result<(FitResult, DecisionTable)> {
    let partition = Partition::new(instances)?;
    let table = build(partition, hyperparameters, rng)?;
    let y_hat = table.predict(instances.x());
    Ok((FitResult::from_predictions(instances.y(), y_hat), table))
}

/// Builds a decision table of the configured depth over `partition`.
///
/// The first sweep decides depths `0..depth` greedily. Every later sweep
/// (multi-pass modes only) revisits one depth at a time: the two partitions that
/// differ only in that depth's bit are merged back together, the best rule is
/// searched again given all other depths, and the new rule is applied.
///
/// If the first sweep finds no usable split at some depth the table is
/// truncated to the depths decided so far.
pub fn build<R: Rng + ?Sized>(
    partition: Partition<'_, '_>,
    hyperparameters: &TableParams,
    rng: &mut R,
) -> Result<DecisionTable> {
    hyperparameters.validate()?;
    if partition.is_empty() {
        return Err(Error::invalid("cannot build a decision table on zero instances"));
    }

    let logger = TrainingLogger::new(hyperparameters.verbosity);
    let depth = hyperparameters.depth;
    logger.info(format_args!(
        "building depth-{depth} decision table ({:?}) on {} instances",
        hyperparameters.mode,
        partition.len()
    ));

    let attributes: Vec<usize> = (0..partition.n_attributes()).collect();
    let bit = |d: usize| 1u64 << (depth - d - 1);

    let mut partitions: PartitionMap<'_, '_> = BTreeMap::new();
    partitions.insert(0, partition);
    let mut rules: Vec<Rule> = Vec::with_capacity(depth);

    for d in 0..depth {
        match best_rule(&partitions, &attributes, rng) {
            Some(rule) => {
                logger.debug(format_args!(
                    "depth {d}: x{} <= {}",
                    rule.attribute, rule.threshold
                ));
                partitions = apply_rule(partitions, rule, bit(d));
                rules.push(rule);
            }
            None => {
                logger.warn(format_args!(
                    "no split found at depth {d}, truncating table to depth {d}"
                ));
                break;
            }
        }
    }

    let decided = rules.len();
    if decided > 0 {
        for pass in 1..hyperparameters.effective_passes() {
            let mut changed = 0;
            for step in 0..decided {
                let d = match hyperparameters.mode {
                    ConstructionMode::MultiPassRandom => rng.gen_range(0..decided),
                    _ => step,
                };
                partitions = merge_bit(partitions, bit(d));
                // the previous rule stays when nothing better is found
                let rule = best_rule(&partitions, &attributes, rng).unwrap_or(rules[d]);
                if rule != rules[d] {
                    changed += 1;
                }
                partitions = apply_rule(partitions, rule, bit(d));
                rules[d] = rule;
            }
            logger.info(format_args!("pass {pass}: {changed} depth(s) changed"));
        }
    }

    // drop the low bits of depths that were never decided
    let shift = depth - decided;
    let (indices, predictions): (Vec<u64>, Vec<f64>) = partitions
        .iter()
        .map(|(&mask, p)| (mask >> shift, p.weighted_mean()))
        .unzip();
    DecisionTable::new(
        rules.iter().map(|r| r.attribute).collect(),
        rules.iter().map(|r| r.threshold).collect(),
        indices,
        predictions,
    )
}

/// Best rule across all attributes, scoring each candidate by its gain summed
/// over every active partition. Ties are broken with `rng`.
fn best_rule<R: Rng + ?Sized>(
    partitions: &PartitionMap<'_, '_>,
    attributes: &[usize],
    rng: &mut R,
) -> Option<Rule> {
    let active: Vec<&Partition<'_, '_>> = partitions.values().collect();
    let mut best = BestSplits::new();
    for &attribute in attributes {
        scan_summed(attribute, &active, &mut best);
    }
    best.choose(rng).map(|c| Rule {
        attribute: c.attribute,
        threshold: c.threshold,
    })
}

/// Splits every partition by `rule`; the `<=` side gets `bit` set. Empty
/// children are not kept.
fn apply_rule<'s, 'a>(partitions: PartitionMap<'s, 'a>, rule: Rule, bit: u64) -> PartitionMap<'s, 'a> {
    let mut next = BTreeMap::new();
    for (mask, partition) in partitions {
        debug_assert_eq!(mask & bit, 0);
        let (left, right) = partition.split(rule.attribute, rule.threshold);
        if !left.is_empty() {
            next.insert(mask | bit, left);
        }
        if !right.is_empty() {
            next.insert(mask, right);
        }
    }
    next
}

/// Merges every pair of partitions that differ only in `bit`, clearing it.
fn merge_bit<'s, 'a>(partitions: PartitionMap<'s, 'a>, bit: u64) -> PartitionMap<'s, 'a> {
    let mut merged = BTreeMap::new();
    // ascending order: the cleared partner of a set mask is always seen first
    for (mask, partition) in partitions {
        if mask & bit == 0 {
            merged.insert(mask, partition);
            continue;
        }
        let base = mask & !bit;
        let combined = match merged.remove(&base) {
            Some(right) => Partition::merge(partition, right),
            None => partition,
        };
        merged.insert(base, combined);
    }
    merged
}

#[cfg(test)]
mod tests {
    use ndarray::{array, Array1, Array2, Axis};
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::table::params::TableParamsBuilder;
    use crate::test_data::{friedman, sparse_data, step_data};

    macro_rules! assert_float_eq {
        ($x:expr, $y:expr, $d:expr) => {
            assert!(($x - $y).abs() < $d, "{} != {}", $x, $y);
        };
    }

    fn params(depth: usize, mode: ConstructionMode, n_passes: usize) -> TableParams {
        TableParamsBuilder::new()
            .depth(depth)
            .mode(mode)
            .n_passes(n_passes)
            .build()
    }

    #[test]
    fn test_depth_zero_is_weighted_mean() {
        let (x, y) = friedman(50, 1);
        let w = Array1::from_shape_fn(50, |i| 1.0 + (i % 4) as f64);
        let instances = Instances::new(x.view(), y.view())
            .unwrap()
            .with_weights(w.view())
            .unwrap();
        let expected = (&w * &y).sum() / w.sum();
        for mode in [
            ConstructionMode::OnePass,
            ConstructionMode::MultiPass,
            ConstructionMode::MultiPassRandom,
        ] {
            let mut rng = StdRng::seed_from_u64(0);
            let (_, table) = fit_instances(&instances, &params(0, mode, 3), &mut rng).unwrap();
            assert_eq!(table.depth(), 0);
            assert_eq!(table.indices(), &[0]);
            assert_float_eq!(table.predictions()[0], expected, 1e-9);
        }
    }

    #[test]
    fn test_step_function_single_depth() {
        let (x, y) = step_data();
        let mut rng = StdRng::seed_from_u64(0);
        let (fit_result, table) =
            fit(x.view(), y.view(), &params(1, ConstructionMode::OnePass, 1), &mut rng).unwrap();
        assert_eq!(table.attributes(), &[0]);
        assert_eq!(table.thresholds(), &[6.5]);
        assert_eq!(table.indices(), &[0, 1]);
        assert_eq!(table.predictions(), &[1.0, 0.0]);
        assert_eq!(fit_result.err, 0.0);
    }

    #[test]
    fn test_cyclic_single_pass_equals_one_pass() {
        let (x, y) = friedman(300, 2);
        for seed in 0..5 {
            let (_, one_pass) = fit(
                x.view(),
                y.view(),
                &params(4, ConstructionMode::OnePass, 1),
                &mut StdRng::seed_from_u64(seed),
            )
            .unwrap();
            let (_, cyclic) = fit(
                x.view(),
                y.view(),
                &params(4, ConstructionMode::MultiPass, 1),
                &mut StdRng::seed_from_u64(seed),
            )
            .unwrap();
            assert_eq!(one_pass, cyclic);
        }
    }

    #[test]
    fn test_leaves_are_weighted_means_of_their_paths() {
        let (x, y) = friedman(200, 3);
        for mode in [ConstructionMode::MultiPass, ConstructionMode::MultiPassRandom] {
            let mut rng = StdRng::seed_from_u64(4);
            let (_, table) = fit(x.view(), y.view(), &params(3, mode, 3), &mut rng).unwrap();
            for (&mask, &prediction) in table.indices().iter().zip(table.predictions()) {
                let members: Vec<usize> = x
                    .axis_iter(Axis(0))
                    .enumerate()
                    .filter(|(_, row)| table.path(*row) == mask)
                    .map(|(i, _)| i)
                    .collect();
                assert!(!members.is_empty());
                let mean = members.iter().map(|&i| y[i]).sum::<f64>() / members.len() as f64;
                assert_float_eq!(prediction, mean, 1e-9);
            }
        }
    }

    #[test]
    fn test_backfitting_never_hurts_training_error() {
        let (x, y) = friedman(400, 5);
        let mut rng = StdRng::seed_from_u64(11);
        let (one_pass, _) =
            fit(x.view(), y.view(), &params(4, ConstructionMode::OnePass, 1), &mut rng).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let (multi_pass, table) =
            fit(x.view(), y.view(), &params(4, ConstructionMode::MultiPass, 4), &mut rng).unwrap();
        assert_eq!(table.depth(), 4);
        assert!(multi_pass.err <= one_pass.err + 1e-9);
    }

    #[test]
    fn test_truncates_when_no_split_exists() {
        // a single binary feature can only be used once
        let x = array![[0.0], [1.0], [0.0], [1.0]];
        let y = array![1.0, 2.0, 3.0, 4.0];
        let mut rng = StdRng::seed_from_u64(0);
        let (_, table) =
            fit(x.view(), y.view(), &params(3, ConstructionMode::MultiPass, 2), &mut rng).unwrap();
        assert_eq!(table.depth(), 1);
        assert_eq!(table.indices(), &[0, 1]);
        assert_eq!(table.predictions(), &[3.0, 2.0]);
        assert_eq!(table.regress(array![0.0].view()), 2.0);
    }

    #[test]
    fn test_constant_feature_gives_depth_zero() {
        let x = Array2::from_elem((5, 2), 1.0);
        let y = array![1.0, 2.0, 3.0, 4.0, 5.0];
        let mut rng = StdRng::seed_from_u64(0);
        let (_, table) =
            fit(x.view(), y.view(), &params(2, ConstructionMode::OnePass, 1), &mut rng).unwrap();
        assert_eq!(table.depth(), 0);
        assert_eq!(table.predictions(), &[3.0]);
    }

    #[test]
    fn test_depth_above_limit_is_rejected() {
        let (x, y) = step_data();
        let mut rng = StdRng::seed_from_u64(0);
        let res = fit(x.view(), y.view(), &params(64, ConstructionMode::OnePass, 1), &mut rng);
        assert!(matches!(res, Err(Error::DepthTooLarge { depth: 64, .. })));
    }

    #[test]
    fn test_sparse_storage_gives_same_table() {
        let (x, y) = sparse_data(150, 6, 0.3, 8);
        let dense = Instances::new(x.view(), y.view()).unwrap();
        let sparse = Instances::new(x.view(), y.view()).unwrap().sparse(true);
        let p = params(3, ConstructionMode::MultiPass, 2);
        let (_, a) = fit_instances(&dense, &p, &mut StdRng::seed_from_u64(1)).unwrap();
        let (_, b) = fit_instances(&sparse, &p, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(a.attributes(), b.attributes());
        assert_eq!(a.thresholds(), b.thresholds());
        assert_eq!(a.indices(), b.indices());
        for (pa, pb) in a.predictions().iter().zip(b.predictions()) {
            assert_float_eq!(pa, pb, 1e-9);
        }
    }

    #[test]
    fn test_merge_bit_restores_pre_split_state() {
        let (x, y) = friedman(64, 6);
        let instances = Instances::new(x.view(), y.view()).unwrap();
        let mut partitions = BTreeMap::new();
        partitions.insert(0, Partition::new(&instances).unwrap());
        let first = Rule { attribute: 0, threshold: 0.5 };
        let second = Rule { attribute: 1, threshold: 0.3 };
        let partitions = apply_rule(partitions, first, 0b10);
        let partitions = apply_rule(partitions, second, 0b01);
        assert_eq!(partitions.values().map(|p| p.len()).sum::<usize>(), 64);

        let merged = merge_bit(partitions, 0b10);
        assert!(merged.keys().all(|m| m & 0b10 == 0));
        for (&mask, partition) in &merged {
            for local in 0..partition.len() {
                let goes_left = partition.value(local, 1) <= 0.3;
                assert_eq!(goes_left, mask & 0b01 != 0);
            }
            assert!(partition.column(0).unwrap().is_sorted());
        }
    }
}
