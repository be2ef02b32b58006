use std::str::FromStr;

use crate::error::{Error, Result};
use crate::logger::Verbosity;

/// When a regression tree stops growing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GrowthPolicy {
    /// Nodes at `max_depth` become leaves.
    DepthLimited { max_depth: usize },
    /// Best-first expansion by split gain until the tree has `max_leaves` leaves.
    NumLeavesLimited { max_leaves: usize },
    /// Depth-first expansion; nodes with at most `min_leaf_size` instances become leaves.
    MinLeafSize { min_leaf_size: usize },
    /// Like `MinLeafSize` with the floor set to `alpha` times the root size.
    Alpha { alpha: f64 },
}

impl GrowthPolicy {
    pub fn validate(&self) -> Result<()> {
        match *self {
            GrowthPolicy::NumLeavesLimited { max_leaves: 0 } => {
                Err(Error::invalid("max_leaves must be at least 1"))
            }
            GrowthPolicy::Alpha { alpha } if !(alpha > 0.0 && alpha <= 1.0) => Err(
                Error::invalid(format!("alpha must lie in (0, 1], got {alpha}")),
            ),
            _ => Ok(()),
        }
    }
}

/// Parses `name:value`, e.g. `depth:4`, `leaves:16`, `minleafsize:20`, `alpha:0.01`.
impl FromStr for GrowthPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (name, value) = s
            .split_once(':')
            .ok_or_else(|| Error::invalid(format!("expected <policy>:<value>, got '{s}'")))?;
        let bad_value = || Error::invalid(format!("bad value in growth policy '{s}'"));
        let policy = match name.trim().to_ascii_lowercase().as_str() {
            "depth" => GrowthPolicy::DepthLimited {
                max_depth: value.trim().parse().map_err(|_| bad_value())?,
            },
            "leaves" | "numleaves" => GrowthPolicy::NumLeavesLimited {
                max_leaves: value.trim().parse().map_err(|_| bad_value())?,
            },
            "minleafsize" => GrowthPolicy::MinLeafSize {
                min_leaf_size: value.trim().parse().map_err(|_| bad_value())?,
            },
            "alpha" => GrowthPolicy::Alpha {
                alpha: value.trim().parse().map_err(|_| bad_value())?,
            },
            other => return Err(Error::invalid(format!("unknown growth policy '{other}'"))),
        };
        policy.validate()?;
        Ok(policy)
    }
}

#[derive(Debug, Clone)]
pub struct TreeParams {
    pub policy: GrowthPolicy,
    /// Nodes with fewer instances than this are always leaves.
    pub min_split_size: usize,
    /// Fraction of attributes sampled at every node; below 1.0 gives the
    /// randomized-forest variant.
    pub feature_fraction: f64,
    pub verbosity: Verbosity,
}

impl TreeParams {
    pub fn validate(&self) -> Result<()> {
        self.policy.validate()?;
        if !(self.feature_fraction > 0.0 && self.feature_fraction <= 1.0) {
            return Err(Error::invalid(format!(
                "feature_fraction must lie in (0, 1], got {}",
                self.feature_fraction
            )));
        }
        Ok(())
    }
}

// Builder for TreeParams
#[derive(Debug, Clone)]
pub struct TreeParamsBuilder {
    policy: GrowthPolicy,
    min_split_size: usize,
    feature_fraction: f64,
    verbosity: Verbosity,
}

impl TreeParamsBuilder {
    pub fn new() -> Self {
        let defaults = TreeParams::default();
        Self {
            policy: defaults.policy,
            min_split_size: defaults.min_split_size,
            feature_fraction: defaults.feature_fraction,
            verbosity: defaults.verbosity,
        }
    }

    pub fn policy(mut self, policy: GrowthPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.policy = GrowthPolicy::DepthLimited { max_depth };
        self
    }

    pub fn max_leaves(mut self, max_leaves: usize) -> Self {
        self.policy = GrowthPolicy::NumLeavesLimited { max_leaves };
        self
    }

    pub fn min_leaf_size(mut self, min_leaf_size: usize) -> Self {
        self.policy = GrowthPolicy::MinLeafSize { min_leaf_size };
        self
    }

    pub fn alpha(mut self, alpha: f64) -> Self {
        self.policy = GrowthPolicy::Alpha { alpha };
        self
    }

    pub fn min_split_size(mut self, min_split_size: usize) -> Self {
        self.min_split_size = min_split_size;
        self
    }

    pub fn feature_fraction(mut self, feature_fraction: f64) -> Self {
        self.feature_fraction = feature_fraction;
        self
    }

    pub fn verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn build(self) -> TreeParams {
        TreeParams {
            policy: self.policy,
            min_split_size: self.min_split_size,
            feature_fraction: self.feature_fraction,
            verbosity: self.verbosity,
        }
    }
}

impl Default for TreeParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for TreeParams {
    fn default() -> Self {
        TreeParams {
            policy: GrowthPolicy::DepthLimited { max_depth: 6 },
            min_split_size: 2,
            feature_fraction: 1.0,
            verbosity: Verbosity::Silent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_policies() {
        assert_eq!(
            "depth:3".parse::<GrowthPolicy>().unwrap(),
            GrowthPolicy::DepthLimited { max_depth: 3 }
        );
        assert_eq!(
            "Leaves:16".parse::<GrowthPolicy>().unwrap(),
            GrowthPolicy::NumLeavesLimited { max_leaves: 16 }
        );
        assert_eq!(
            "minleafsize:20".parse::<GrowthPolicy>().unwrap(),
            GrowthPolicy::MinLeafSize { min_leaf_size: 20 }
        );
        assert_eq!(
            "alpha:0.05".parse::<GrowthPolicy>().unwrap(),
            GrowthPolicy::Alpha { alpha: 0.05 }
        );
    }

    #[test]
    fn test_malformed_policies_are_rejected() {
        for s in ["depth", "depth:x", "width:3", "alpha:1.5", "leaves:0"] {
            assert!(s.parse::<GrowthPolicy>().is_err(), "{s}");
        }
    }

    #[test]
    fn test_builder_overrides_defaults() {
        let params = TreeParamsBuilder::new()
            .max_leaves(8)
            .feature_fraction(0.5)
            .build();
        assert_eq!(params.policy, GrowthPolicy::NumLeavesLimited { max_leaves: 8 });
        assert_eq!(params.feature_fraction, 0.5);
        assert_eq!(params.min_split_size, 2);
        assert!(params.validate().is_ok());
    }
}
