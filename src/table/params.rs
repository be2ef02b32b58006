use std::str::FromStr;

use crate::error::{Error, Result};
use crate::logger::Verbosity;

/// Paths are `u64` bitmasks; 63 keeps every mask representable as a signed
/// 64-bit integer in the text format.
pub const MAX_DEPTH: usize = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructionMode {
    /// Each depth decided once, in order.
    OnePass,
    /// Full sweeps repeated `n_passes` times; later sweeps backfit every depth in order.
    MultiPass,
    /// Like `MultiPass`, but after the first sweep the depth to backfit is drawn at random.
    MultiPassRandom,
}

impl FromStr for ConstructionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "onepass" | "one-pass" => Ok(ConstructionMode::OnePass),
            "multipass" | "multi-pass" | "multipass-cyclic" => Ok(ConstructionMode::MultiPass),
            "multipass-random" | "multi-pass-random" => Ok(ConstructionMode::MultiPassRandom),
            other => Err(Error::invalid(format!("unknown construction mode '{other}'"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TableParams {
    pub depth: usize,
    pub mode: ConstructionMode,
    /// Ignored by `OnePass`.
    pub n_passes: usize,
    pub verbosity: Verbosity,
}

impl TableParams {
    pub fn validate(&self) -> Result<()> {
        if self.depth > MAX_DEPTH {
            return Err(Error::DepthTooLarge {
                depth: self.depth,
                max: MAX_DEPTH,
            });
        }
        if self.n_passes == 0 {
            return Err(Error::invalid("n_passes must be at least 1"));
        }
        Ok(())
    }

    pub fn effective_passes(&self) -> usize {
        match self.mode {
            ConstructionMode::OnePass => 1,
            _ => self.n_passes,
        }
    }
}

// Builder for TableParams
#[derive(Debug, Clone)]
pub struct TableParamsBuilder {
    depth: usize,
    mode: ConstructionMode,
    n_passes: usize,
    verbosity: Verbosity,
}

impl TableParamsBuilder {
    pub fn new() -> Self {
        Self {
            depth: 4,
            mode: ConstructionMode::OnePass,
            n_passes: 1,
            verbosity: Verbosity::Silent,
        }
    }

    pub fn depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn mode(mut self, mode: ConstructionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn n_passes(mut self, n_passes: usize) -> Self {
        self.n_passes = n_passes;
        self
    }

    pub fn verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn build(self) -> TableParams {
        TableParams {
            depth: self.depth,
            mode: self.mode,
            n_passes: self.n_passes,
            verbosity: self.verbosity,
        }
    }
}

impl Default for TableParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for TableParams {
    fn default() -> Self {
        TableParamsBuilder::new().build()
    }
}
