use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

use crate::error::{Error, Result};
use crate::FittedModel;

pub mod fitter;
pub mod params;

pub use fitter::{build, fit, fit_instances};
pub use params::{GrowthPolicy, TreeParams, TreeParamsBuilder};

/// Binary regression tree node.
///
/// Chain-shaped trees can be as deep as the training set is large, so every
/// traversal here (including clone, comparison and drop) uses an explicit stack.
#[derive(Debug)]
pub enum TreeNode {
    Leaf {
        prediction: f64,
    },
    /// Instances with `value <= threshold` go left.
    Interior {
        attribute: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

/// A node without its children, as listed in pre-order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PreorderNode {
    Leaf { prediction: f64 },
    Interior { attribute: usize, threshold: f64 },
}

impl TreeNode {
    pub fn is_leaf(&self) -> bool {
        matches!(self, TreeNode::Leaf { .. })
    }

    pub fn n_leaves(&self) -> usize {
        let mut n = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                TreeNode::Leaf { .. } => n += 1,
                TreeNode::Interior { left, right, .. } => {
                    stack.push(right);
                    stack.push(left);
                }
            }
        }
        n
    }

    /// Number of edges on the longest root-to-leaf path.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 0)];
        while let Some((node, depth)) = stack.pop() {
            match node {
                TreeNode::Leaf { .. } => deepest = deepest.max(depth),
                TreeNode::Interior { left, right, .. } => {
                    stack.push((right.as_ref(), depth + 1));
                    stack.push((left.as_ref(), depth + 1));
                }
            }
        }
        deepest
    }

    /// Node, left subtree, right subtree.
    pub fn preorder(&self) -> Vec<PreorderNode> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                TreeNode::Leaf { prediction } => out.push(PreorderNode::Leaf {
                    prediction: *prediction,
                }),
                TreeNode::Interior {
                    attribute,
                    threshold,
                    left,
                    right,
                } => {
                    out.push(PreorderNode::Interior {
                        attribute: *attribute,
                        threshold: *threshold,
                    });
                    stack.push(right);
                    stack.push(left);
                }
            }
        }
        out
    }

    /// Inverse of [`TreeNode::preorder`]. Fails unless `nodes` lists exactly
    /// one complete tree.
    pub fn from_preorder(nodes: &[PreorderNode]) -> Result<TreeNode> {
        assemble(nodes).map_err(Error::invalid)
    }
}

/// Walks the listing backwards: every subtree is complete on the stack by the
/// time its parent is reached, left child on top.
fn assemble(nodes: &[PreorderNode]) -> std::result::Result<TreeNode, &'static str> {
    let mut built: Vec<TreeNode> = Vec::new();
    for node in nodes.iter().rev() {
        let node = match *node {
            PreorderNode::Leaf { prediction } => TreeNode::Leaf { prediction },
            PreorderNode::Interior {
                attribute,
                threshold,
            } => {
                let (Some(left), Some(right)) = (built.pop(), built.pop()) else {
                    return Err("tree ends before every interior node has two children");
                };
                TreeNode::Interior {
                    attribute,
                    threshold,
                    left: Box::new(left),
                    right: Box::new(right),
                }
            }
        };
        built.push(node);
    }
    match (built.pop(), built.is_empty()) {
        (Some(root), true) => Ok(root),
        (None, _) => Err("a tree needs at least one node"),
        (Some(_), false) => Err("nodes left over after a complete tree"),
    }
}

impl Clone for TreeNode {
    fn clone(&self) -> Self {
        match assemble(&self.preorder()) {
            Ok(node) => node,
            Err(message) => unreachable!("pre-order of a tree is complete: {message}"),
        }
    }
}

impl PartialEq for TreeNode {
    fn eq(&self, other: &Self) -> bool {
        self.preorder() == other.preorder()
    }
}

impl Drop for TreeNode {
    fn drop(&mut self) {
        let mut stack = Vec::new();
        detach_children(self, &mut stack);
        while let Some(mut node) = stack.pop() {
            detach_children(&mut node, &mut stack);
        }
    }
}

/// Moves the children of `node` onto `stack`, leaving placeholder leaves, so
/// dropping `node` no longer recurses.
fn detach_children(node: &mut TreeNode, stack: &mut Vec<TreeNode>) {
    if let TreeNode::Interior { left, right, .. } = node {
        let placeholder = || TreeNode::Leaf { prediction: 0.0 };
        stack.push(std::mem::replace(left.as_mut(), placeholder()));
        stack.push(std::mem::replace(right.as_mut(), placeholder()));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegressionTree {
    root: TreeNode,
}

impl RegressionTree {
    pub const fn new(root: TreeNode) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &TreeNode {
        &self.root
    }

    pub fn n_leaves(&self) -> usize {
        self.root.n_leaves()
    }

    pub fn depth(&self) -> usize {
        self.root.depth()
    }

    #[inline]
    pub fn regress(&self, x: ArrayView1<f64>) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                TreeNode::Leaf { prediction } => return *prediction,
                TreeNode::Interior {
                    attribute,
                    threshold,
                    left,
                    right,
                } => {
                    node = if x[*attribute] <= *threshold { left } else { right };
                }
            }
        }
    }
}

impl FittedModel for RegressionTree {
    fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.axis_iter(Axis(0)).map(|row| self.regress(row)).collect()
    }
}
