use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ndarray::{ArrayView1, ArrayView2};
use rand::{seq::index::sample, Rng};

use crate::data::Instances;
use crate::dataset::Partition;
use crate::error::{Error, Result};
use crate::histogram::{find_best_splits, side_gain, SplitCandidate};
use crate::logger::TrainingLogger;
use crate::{FitResult, FittedModel};

use super::params::{GrowthPolicy, TreeParams};
use super::{RegressionTree, TreeNode};

pub fn fit<'a, R: Rng + ?Sized>(
    x: ArrayView2<'a, f64>,
    y: ArrayView1<'a, f64>,
    hyperparameters: &TreeParams,
    rng: &mut R,
) -> Result<(FitResult, RegressionTree)> {
    let instances = Instances::new(x, y)?;
    fit_instances(&instances, hyperparameters, rng)
}

pub fn fit_instances<R: Rng + ?Sized>(
    instances: &Instances<'_>,
    hyperparameters: &TreeParams,
    rng: &mut R,
) -> Result<(FitResult, RegressionTree)> {
    let partition = Partition::new(instances)?;
    let tree = build(partition, hyperparameters, rng)?;
    let y_hat = tree.predict(instances.x());
    Ok((FitResult::from_predictions(instances.y(), y_hat), tree))
}

/// Grows a regression tree over `partition` under the configured growth policy.
pub fn build<R: Rng + ?Sized>(
    partition: Partition<'_, '_>,
    hyperparameters: &TreeParams,
    rng: &mut R,
) -> Result<RegressionTree> {
    hyperparameters.validate()?;
    if partition.is_empty() {
        return Err(Error::invalid("cannot grow a tree on zero instances"));
    }

    let logger = TrainingLogger::new(hyperparameters.verbosity);
    logger.info(format_args!(
        "growing regression tree ({:?}) on {} instances, {} attributes",
        hyperparameters.policy,
        partition.len(),
        partition.n_attributes()
    ));

    let (max_depth, leaf_floor) = match hyperparameters.policy {
        GrowthPolicy::DepthLimited { max_depth } => (Some(max_depth), 0.0),
        GrowthPolicy::NumLeavesLimited { .. } => (None, 0.0),
        GrowthPolicy::MinLeafSize { min_leaf_size } => (None, min_leaf_size as f64),
        GrowthPolicy::Alpha { alpha } => (None, alpha * partition.len() as f64),
    };

    let mut grower = TreeGrower {
        params: hyperparameters,
        rng,
        n_attributes: partition.n_attributes(),
        max_depth,
        leaf_floor,
        nodes: vec![GrowNode::Pending],
        next_order: 0,
    };
    match hyperparameters.policy {
        GrowthPolicy::NumLeavesLimited { max_leaves } => grower.grow_best_first(partition, max_leaves),
        _ => grower.grow_depth_first(partition),
    }

    let root = materialize(&grower.nodes);
    logger.info(format_args!(
        "tree done: {} leaves, depth {}",
        root.n_leaves(),
        root.depth()
    ));
    Ok(RegressionTree::new(root))
}

#[derive(Debug, Clone, Copy)]
enum GrowNode {
    Pending,
    Leaf(f64),
    Interior {
        attribute: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

enum Evaluation {
    Leaf(f64),
    Split {
        candidate: SplitCandidate,
        /// Reduction in weighted squared error.
        reduction: f64,
        mean: f64,
    },
}

struct QueueItem<'s, 'a> {
    reduction: f64,
    order: usize,
    node: usize,
    depth: usize,
    partition: Partition<'s, 'a>,
    candidate: SplitCandidate,
    mean: f64,
}

impl PartialEq for QueueItem<'_, '_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueItem<'_, '_> {}

impl PartialOrd for QueueItem<'_, '_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Highest reduction first; among equal reductions the node queued first.
impl Ord for QueueItem<'_, '_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.reduction
            .total_cmp(&other.reduction)
            .then_with(|| other.order.cmp(&self.order))
    }
}

struct TreeGrower<'p, 'r, R: Rng + ?Sized> {
    params: &'p TreeParams,
    rng: &'r mut R,
    n_attributes: usize,
    max_depth: Option<usize>,
    leaf_floor: f64,
    nodes: Vec<GrowNode>,
    next_order: usize,
}

impl<R: Rng + ?Sized> TreeGrower<'_, '_, R> {
    fn evaluate(&mut self, partition: &Partition<'_, '_>, depth: usize) -> Evaluation {
        let mean = partition.weighted_mean();
        let size = partition.len();
        if size < self.params.min_split_size
            || size as f64 <= self.leaf_floor
            || self.max_depth.is_some_and(|max_depth| depth >= max_depth)
            || partition.has_constant_target()
        {
            return Evaluation::Leaf(mean);
        }

        let attributes = self.sample_attributes();
        match find_best_splits(partition, &attributes).choose(&mut *self.rng) {
            None => Evaluation::Leaf(mean),
            Some(candidate) => {
                let baseline = side_gain(partition.weighted_sum(), partition.total_weight());
                Evaluation::Split {
                    candidate,
                    reduction: candidate.gain - baseline,
                    mean,
                }
            }
        }
    }

    fn sample_attributes(&mut self) -> Vec<usize> {
        let n = self.n_attributes;
        if n == 0 || self.params.feature_fraction >= 1.0 {
            return (0..n).collect();
        }
        let k = ((self.params.feature_fraction * n as f64).ceil() as usize).clamp(1, n);
        let mut picked = sample(&mut *self.rng, n, k).into_vec();
        picked.sort_unstable();
        picked
    }

    /// Turns `node` into an interior node and allocates its two children.
    fn attach(&mut self, node: usize, candidate: SplitCandidate) -> (usize, usize) {
        let left = self.nodes.len();
        let right = left + 1;
        self.nodes.push(GrowNode::Pending);
        self.nodes.push(GrowNode::Pending);
        self.nodes[node] = GrowNode::Interior {
            attribute: candidate.attribute,
            threshold: candidate.threshold,
            left,
            right,
        };
        (left, right)
    }

    fn grow_depth_first(&mut self, root: Partition<'_, '_>) {
        let mut stack = vec![(0, root, 0)];
        while let Some((node, partition, depth)) = stack.pop() {
            match self.evaluate(&partition, depth) {
                Evaluation::Leaf(prediction) => self.nodes[node] = GrowNode::Leaf(prediction),
                Evaluation::Split { candidate, .. } => {
                    let (left, right) = partition.split(candidate.attribute, candidate.threshold);
                    drop(partition);
                    let (left_node, right_node) = self.attach(node, candidate);
                    stack.push((right_node, right, depth + 1));
                    stack.push((left_node, left, depth + 1));
                }
            }
        }
    }

    fn grow_best_first(&mut self, root: Partition<'_, '_>, max_leaves: usize) {
        let mut queue = BinaryHeap::new();
        let mut n_leaves = 0;
        self.enqueue(0, root, 0, &mut queue, &mut n_leaves);

        while n_leaves + queue.len() < max_leaves {
            let Some(item) = queue.pop() else {
                break;
            };
            let QueueItem {
                node,
                depth,
                partition,
                candidate,
                ..
            } = item;
            let (left, right) = partition.split(candidate.attribute, candidate.threshold);
            drop(partition);
            let (left_node, right_node) = self.attach(node, candidate);
            self.enqueue(left_node, left, depth + 1, &mut queue, &mut n_leaves);
            self.enqueue(right_node, right, depth + 1, &mut queue, &mut n_leaves);
        }

        // out of budget: whatever is still queued keeps its mean
        for item in queue {
            self.nodes[item.node] = GrowNode::Leaf(item.mean);
        }
    }

    fn enqueue<'s, 'a>(
        &mut self,
        node: usize,
        partition: Partition<'s, 'a>,
        depth: usize,
        queue: &mut BinaryHeap<QueueItem<'s, 'a>>,
        n_leaves: &mut usize,
    ) {
        match self.evaluate(&partition, depth) {
            Evaluation::Leaf(prediction) => {
                self.nodes[node] = GrowNode::Leaf(prediction);
                *n_leaves += 1;
            }
            Evaluation::Split {
                candidate,
                reduction,
                mean,
            } => {
                queue.push(QueueItem {
                    reduction,
                    order: self.next_order,
                    node,
                    depth,
                    partition,
                    candidate,
                    mean,
                });
                self.next_order += 1;
            }
        }
    }
}

/// Converts the arena into boxed nodes bottom-up. Children are always
/// allocated after their parent, so walking indices backwards builds every
/// child before the node that owns it.
fn materialize(nodes: &[GrowNode]) -> TreeNode {
    let mut built: Vec<Option<TreeNode>> = (0..nodes.len()).map(|_| None).collect();
    for index in (0..nodes.len()).rev() {
        let node = match nodes[index] {
            GrowNode::Leaf(prediction) => TreeNode::Leaf { prediction },
            GrowNode::Interior {
                attribute,
                threshold,
                left,
                right,
            } => TreeNode::Interior {
                attribute,
                threshold,
                left: Box::new(take_built(&mut built, left)),
                right: Box::new(take_built(&mut built, right)),
            },
            GrowNode::Pending => unreachable!("every node is resolved before the tree is returned"),
        };
        built[index] = Some(node);
    }
    take_built(&mut built, 0)
}

fn take_built(built: &mut [Option<TreeNode>], index: usize) -> TreeNode {
    match built[index].take() {
        Some(node) => node,
        None => unreachable!("node {index} is built before its parent and taken once"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use ndarray::{array, Array1, Array2, Axis};
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::data::Attribute;
    use crate::test_data::{friedman, step_data};
    use crate::tree::params::TreeParamsBuilder;

    macro_rules! assert_float_eq {
        ($x:expr, $y:expr, $d:expr) => {
            assert!(($x - $y).abs() < $d, "{} != {}", $x, $y);
        };
    }

    fn leaf_of<'t>(node: &'t TreeNode, row: ArrayView1<f64>) -> &'t TreeNode {
        match node {
            TreeNode::Leaf { .. } => node,
            TreeNode::Interior {
                attribute,
                threshold,
                left,
                right,
            } => {
                if row[*attribute] <= *threshold {
                    leaf_of(left, row)
                } else {
                    leaf_of(right, row)
                }
            }
        }
    }

    fn assert_leaves_are_weighted_means(
        tree: &RegressionTree,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        w: ArrayView1<f64>,
    ) {
        let mut sums: HashMap<*const TreeNode, (f64, f64)> = HashMap::new();
        for (i, row) in x.axis_iter(Axis(0)).enumerate() {
            let leaf = leaf_of(tree.root(), row);
            let entry = sums.entry(leaf as *const TreeNode).or_insert((0.0, 0.0));
            entry.0 += w[i];
            entry.1 += w[i] * y[i];
        }
        for row in x.axis_iter(Axis(0)) {
            let leaf = leaf_of(tree.root(), row);
            let (weight, sum) = sums[&(leaf as *const TreeNode)];
            let TreeNode::Leaf { prediction } = leaf else {
                unreachable!()
            };
            if weight > 0.0 {
                assert_float_eq!(*prediction, sum / weight, 1e-9);
            }
        }
    }

    #[test]
    fn test_step_function_splits_at_midpoint() {
        let (x, y) = step_data();
        let mut rng = StdRng::seed_from_u64(42);
        let params = TreeParamsBuilder::new().max_depth(1).build();
        let (fit_result, tree) = fit(x.view(), y.view(), &params, &mut rng).unwrap();

        let TreeNode::Interior {
            attribute,
            threshold,
            left,
            right,
        } = tree.root()
        else {
            panic!("root should be split");
        };
        assert_eq!(*attribute, 0);
        assert_eq!(*threshold, 6.5);
        assert_eq!(**left, TreeNode::Leaf { prediction: 0.0 });
        assert_eq!(**right, TreeNode::Leaf { prediction: 1.0 });
        assert_eq!(fit_result.err, 0.0);
    }

    #[test]
    fn test_depth_limit_is_respected() {
        let (x, y) = friedman(300, 1);
        let mut rng = StdRng::seed_from_u64(42);
        for max_depth in [0, 1, 3, 5] {
            let params = TreeParamsBuilder::new().max_depth(max_depth).build();
            let (_, tree) = fit(x.view(), y.view(), &params, &mut rng).unwrap();
            assert!(tree.depth() <= max_depth);
            assert!(tree.n_leaves() <= 1 << max_depth);
        }
    }

    #[test]
    fn test_leaf_predictions_are_weighted_means() {
        let (x, y) = friedman(200, 2);
        let w = Array1::from_shape_fn(200, |i| 0.5 + (i % 3) as f64);
        let instances = Instances::new(x.view(), y.view())
            .unwrap()
            .with_weights(w.view())
            .unwrap();
        let policies = [
            GrowthPolicy::DepthLimited { max_depth: 4 },
            GrowthPolicy::NumLeavesLimited { max_leaves: 10 },
            GrowthPolicy::MinLeafSize { min_leaf_size: 15 },
            GrowthPolicy::Alpha { alpha: 0.1 },
        ];
        for policy in policies {
            let mut rng = StdRng::seed_from_u64(7);
            let params = TreeParamsBuilder::new().policy(policy).build();
            let (_, tree) = fit_instances(&instances, &params, &mut rng).unwrap();
            assert_leaves_are_weighted_means(&tree, x.view(), y.view(), w.view());
        }
    }

    #[test]
    fn test_leaf_budget_is_reached() {
        let (x, y) = friedman(400, 3);
        let mut rng = StdRng::seed_from_u64(42);
        for max_leaves in [1, 2, 7, 20] {
            let params = TreeParamsBuilder::new().max_leaves(max_leaves).build();
            let (_, tree) = fit(x.view(), y.view(), &params, &mut rng).unwrap();
            assert_eq!(tree.n_leaves(), max_leaves);
        }
    }

    #[test]
    fn test_best_first_prefers_largest_reduction() {
        // x0 separates a big jump, x1 only a small one inside the right half
        let x = array![
            [0.0, 0.0],
            [0.0, 1.0],
            [0.0, 0.0],
            [0.0, 1.0],
            [1.0, 0.0],
            [1.0, 1.0],
            [1.0, 0.0],
            [1.0, 1.0]
        ];
        let y = array![0.0, 0.0, 0.0, 0.0, 10.0, 11.0, 10.0, 11.0];
        let mut rng = StdRng::seed_from_u64(0);
        let params = TreeParamsBuilder::new().max_leaves(2).build();
        let (_, tree) = fit(x.view(), y.view(), &params, &mut rng).unwrap();
        let TreeNode::Interior { attribute, .. } = tree.root() else {
            panic!("root should be split");
        };
        assert_eq!(*attribute, 0);

        let params = TreeParamsBuilder::new().max_leaves(3).build();
        let (fit_result, tree) = fit(x.view(), y.view(), &params, &mut rng).unwrap();
        assert_eq!(tree.n_leaves(), 3);
        assert_float_eq!(fit_result.err, 0.0, 1e-12);
    }

    #[test]
    fn test_min_leaf_size_controls_growth() {
        let (x, y) = friedman(100, 4);
        let mut rng = StdRng::seed_from_u64(1);

        let params = TreeParamsBuilder::new().min_leaf_size(100).build();
        let (_, tree) = fit(x.view(), y.view(), &params, &mut rng).unwrap();
        assert_eq!(tree.n_leaves(), 1);

        // continuous features are all distinct, so unit leaves interpolate
        let params = TreeParamsBuilder::new().min_leaf_size(1).build();
        let (fit_result, _) = fit(x.view(), y.view(), &params, &mut rng).unwrap();
        assert_float_eq!(fit_result.err, 0.0, 1e-12);

        let params = TreeParamsBuilder::new().alpha(1.0).build();
        let (_, tree) = fit(x.view(), y.view(), &params, &mut rng).unwrap();
        assert_eq!(tree.n_leaves(), 1);
    }

    #[test]
    fn test_constant_target_gives_single_leaf() {
        let x = Array2::from_shape_fn((10, 2), |(i, j)| (i * (j + 1)) as f64);
        let y = Array1::from_elem(10, 3.5);
        let mut rng = StdRng::seed_from_u64(0);
        let params = TreeParamsBuilder::new().max_depth(5).build();
        let (_, tree) = fit(x.view(), y.view(), &params, &mut rng).unwrap();
        assert_eq!(tree.root(), &TreeNode::Leaf { prediction: 3.5 });
    }

    #[test]
    fn test_no_split_found_gives_leaf() {
        // single distinct feature value, varying target
        let x = Array2::from_elem((6, 1), 2.0);
        let y = array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut rng = StdRng::seed_from_u64(0);
        let params = TreeParamsBuilder::new().min_leaf_size(1).build();
        let (_, tree) = fit(x.view(), y.view(), &params, &mut rng).unwrap();
        assert_eq!(tree.root(), &TreeNode::Leaf { prediction: 3.5 });
    }

    #[test]
    fn test_empty_input_is_rejected() {
        let x = Array2::<f64>::zeros((0, 3));
        let y = Array1::<f64>::zeros(0);
        let mut rng = StdRng::seed_from_u64(0);
        let res = fit(x.view(), y.view(), &TreeParams::default(), &mut rng);
        assert!(matches!(res, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_feature_subsampling_is_reproducible() {
        let (x, y) = friedman(200, 5);
        let params = TreeParamsBuilder::new()
            .max_depth(4)
            .feature_fraction(0.4)
            .build();
        let (_, a) = fit(x.view(), y.view(), &params, &mut StdRng::seed_from_u64(9)).unwrap();
        let (_, b) = fit(x.view(), y.view(), &params, &mut StdRng::seed_from_u64(9)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_alternating_targets_grow_a_chain() {
        // every best split peels one end instance off the remaining block
        let n = 2000;
        let x = Array2::from_shape_fn((n, 1), |(i, _)| i as f64);
        let y = Array1::from_shape_fn(n, |i| if i % 2 == 0 { 1.0 } else { -1.0 });
        let mut rng = StdRng::seed_from_u64(3);
        let params = TreeParamsBuilder::new().min_leaf_size(1).build();
        let (fit_result, tree) = fit(x.view(), y.view(), &params, &mut rng).unwrap();
        assert_eq!(tree.n_leaves(), n);
        assert_eq!(tree.depth(), n - 1);
        assert_float_eq!(fit_result.err, 0.0, 1e-12);
    }

    #[test]
    fn test_fit_on_views_with_different_owners() {
        let (x, _) = friedman(80, 6);
        let tree = {
            let y = x.column(0).mapv(|v| 3.0 * v);
            let params = TreeParamsBuilder::new().max_depth(2).build();
            let (_, tree) = fit(x.view(), y.view(), &params, &mut StdRng::seed_from_u64(0)).unwrap();
            tree
        };
        assert_eq!(tree.depth(), 2);
        let TreeNode::Interior { attribute, .. } = tree.root() else {
            panic!("root should be split");
        };
        assert_eq!(*attribute, 0);
    }

    #[test]
    fn test_nominal_attribute_is_split_on_codes() {
        let x = array![[0.0], [1.0], [2.0], [0.0], [1.0], [2.0]];
        let y = array![5.0, 5.0, -5.0, 5.0, 5.0, -5.0];
        let instances = Instances::new(x.view(), y.view())
            .unwrap()
            .with_attributes(vec![Attribute::nominal(0, 3)])
            .unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let params = TreeParamsBuilder::new().max_depth(1).build();
        let (fit_result, tree) = fit_instances(&instances, &params, &mut rng).unwrap();
        let TreeNode::Interior { threshold, .. } = tree.root() else {
            panic!("root should be split");
        };
        assert_eq!(*threshold, 1.5);
        assert_float_eq!(fit_result.err, 0.0, 1e-12);
    }
}
