use crate::error::{Error, Result};
use crate::logger::Verbosity;
use crate::tree::{GrowthPolicy, TreeParams, TreeParamsBuilder};

#[derive(Debug, Clone)]
pub struct ForestParams {
    pub n_trees: usize,
    pub tree_params: TreeParams,
    pub verbosity: Verbosity,
}

impl ForestParams {
    pub fn validate(&self) -> Result<()> {
        if self.n_trees == 0 {
            return Err(Error::invalid("a forest needs at least one tree"));
        }
        self.tree_params.validate()
    }
}

// Builder for ForestParams
#[derive(Debug, Clone)]
pub struct ForestParamsBuilder {
    n_trees: usize,
    tree_params_builder: TreeParamsBuilder,
    verbosity: Verbosity,
}

impl ForestParamsBuilder {
    pub fn new() -> Self {
        Self {
            n_trees: 100,
            tree_params_builder: TreeParamsBuilder::new()
                .policy(GrowthPolicy::MinLeafSize { min_leaf_size: 5 })
                .feature_fraction(1.0 / 3.0),
            verbosity: Verbosity::Silent,
        }
    }

    pub fn n_trees(mut self, n_trees: usize) -> Self {
        self.n_trees = n_trees;
        self
    }

    // Convenience methods for nested parameters
    pub fn policy(mut self, policy: GrowthPolicy) -> Self {
        self.tree_params_builder = self.tree_params_builder.policy(policy);
        self
    }

    pub fn feature_fraction(mut self, feature_fraction: f64) -> Self {
        self.tree_params_builder = self.tree_params_builder.feature_fraction(feature_fraction);
        self
    }

    pub fn min_split_size(mut self, min_split_size: usize) -> Self {
        self.tree_params_builder = self.tree_params_builder.min_split_size(min_split_size);
        self
    }

    pub fn verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn build(self) -> ForestParams {
        ForestParams {
            n_trees: self.n_trees,
            tree_params: self.tree_params_builder.build(),
            verbosity: self.verbosity,
        }
    }
}

impl Default for ForestParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for ForestParams {
    fn default() -> Self {
        ForestParamsBuilder::new().build()
    }
}
