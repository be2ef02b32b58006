//! Histogram split search.
//!
//! A sorted column is collapsed into buckets of equal value, then a single
//! left-to-right scan scores every boundary between adjacent buckets with
//! `left_sum² / left_weight + right_sum² / right_weight`. Maximizing this is the
//! same as minimizing the children's weighted squared error.
//!
//! Candidates reaching the best gain are all kept by [`BestSplits`] and one is
//! drawn with the caller's RNG.

use itertools::Itertools;
use rand::Rng;

use crate::data::AttributeKind;
use crate::dataset::Partition;

/// Buckets lighter than this contribute no gain.
pub const WEIGHT_EPSILON: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    pub value: f64,
    pub weight: f64,
    pub sum: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitCandidate {
    pub attribute: usize,
    pub threshold: f64,
    pub gain: f64,
}

/// Gain contributed by one side of a split.
#[inline]
pub fn side_gain(sum: f64, weight: f64) -> f64 {
    if weight < WEIGHT_EPSILON {
        0.0
    } else {
        sum * sum / weight
    }
}

/// Threshold between two adjacent bucket values. Falls back to `lower` when the
/// midpoint rounds up onto `upper`, so `upper` still goes right.
#[inline]
pub fn midpoint(lower: f64, upper: f64) -> f64 {
    let mid = lower + (upper - lower) / 2.0;
    if mid >= upper {
        lower
    } else {
        mid
    }
}

/// Collects every candidate attaining the maximum gain seen so far.
#[derive(Debug, Clone)]
pub struct BestSplits {
    gain: f64,
    candidates: Vec<SplitCandidate>,
}

impl Default for BestSplits {
    fn default() -> Self {
        Self::new()
    }
}

impl BestSplits {
    pub fn new() -> Self {
        Self {
            gain: f64::NEG_INFINITY,
            candidates: Vec::new(),
        }
    }

    pub fn offer(&mut self, candidate: SplitCandidate) {
        if !candidate.gain.is_finite() {
            return;
        }
        if candidate.gain > self.gain {
            self.gain = candidate.gain;
            self.candidates.clear();
            self.candidates.push(candidate);
        } else if candidate.gain == self.gain {
            self.candidates.push(candidate);
        }
    }

    pub fn best_gain(&self) -> Option<f64> {
        (!self.candidates.is_empty()).then_some(self.gain)
    }

    pub fn candidates(&self) -> &[SplitCandidate] {
        &self.candidates
    }

    /// Draws uniformly among the tied candidates. The RNG is only consulted
    /// when there is an actual tie.
    pub fn choose<R: Rng + ?Sized>(self, rng: &mut R) -> Option<SplitCandidate> {
        match self.candidates.len() {
            0 => None,
            1 => Some(self.candidates[0]),
            n => Some(self.candidates[rng.gen_range(0..n)]),
        }
    }
}

/// Buckets of one attribute within a partition, ascending by value.
///
/// Sparse numeric columns get the implicit zero bucket re-inserted from the
/// partition totals. Nominal/binned attributes are counted into one bucket per
/// populated code.
pub fn attribute_buckets(partition: &Partition<'_, '_>, attribute: usize) -> Vec<Bucket> {
    let targets = partition.targets();
    let weights = partition.weights();
    let Some(column) = partition.column(attribute) else {
        return code_buckets(partition, attribute);
    };

    let mut buckets: Vec<Bucket> = Vec::new();
    for entry in column.entries() {
        let w = weights[entry.index];
        let s = w * targets[entry.index];
        match buckets.last_mut() {
            Some(last) if last.value == entry.value => {
                last.weight += w;
                last.sum += s;
            }
            _ => buckets.push(Bucket {
                value: entry.value,
                weight: w,
                sum: s,
            }),
        }
    }

    let n_missing = partition.len() - column.len();
    if n_missing > 0 {
        let (mut zero_weight, mut zero_sum) = (partition.total_weight(), partition.weighted_sum());
        for bucket in &buckets {
            zero_weight -= bucket.weight;
            zero_sum -= bucket.sum;
        }
        let at = buckets.partition_point(|b| b.value < 0.0);
        buckets.insert(
            at,
            Bucket {
                value: 0.0,
                weight: zero_weight.max(0.0),
                sum: zero_sum,
            },
        );
    }
    buckets
}

fn code_buckets(partition: &Partition<'_, '_>, attribute: usize) -> Vec<Bucket> {
    let n_codes = match partition.source().attributes()[attribute].kind {
        AttributeKind::Numeric => unreachable!("numeric attributes always carry a column"),
        kind => kind.n_buckets().unwrap_or(0),
    };
    let mut counts = vec![0usize; n_codes];
    let mut histogram = vec![(0.0, 0.0); n_codes];
    for (local, (&w, &t)) in partition.weights().iter().zip(partition.targets()).enumerate() {
        let code = partition.value(local, attribute) as usize;
        counts[code] += 1;
        histogram[code].0 += w;
        histogram[code].1 += w * t;
    }
    histogram
        .into_iter()
        .enumerate()
        .filter(|(code, _)| counts[*code] > 0)
        .map(|(code, (weight, sum))| Bucket {
            value: code as f64,
            weight,
            sum,
        })
        .collect()
}

/// Scores every boundary of one attribute's buckets and offers them to `best`.
pub fn scan_buckets(
    attribute: usize,
    buckets: &[Bucket],
    total_weight: f64,
    total_sum: f64,
    best: &mut BestSplits,
) {
    let (mut left_weight, mut left_sum) = (0.0, 0.0);
    for (lower, upper) in buckets.iter().tuple_windows() {
        left_weight += lower.weight;
        left_sum += lower.sum;
        let gain = side_gain(left_sum, left_weight)
            + side_gain(total_sum - left_sum, total_weight - left_weight);
        best.offer(SplitCandidate {
            attribute,
            threshold: midpoint(lower.value, upper.value),
            gain,
        });
    }
}

/// Best splits of `partition` over the given attributes.
pub fn find_best_splits(partition: &Partition<'_, '_>, attributes: &[usize]) -> BestSplits {
    let total_weight = partition.total_weight();
    let total_sum = partition.weighted_sum();
    let mut best = BestSplits::new();
    for &attribute in attributes {
        let buckets = attribute_buckets(partition, attribute);
        scan_buckets(attribute, &buckets, total_weight, total_sum, &mut best);
    }
    best
}

/// Scores one attribute across several partitions at once: the gain of a
/// threshold is the sum of its gains within every partition. Buckets of all
/// partitions are merged in value order and scanned once, keeping a running
/// per-partition left sum.
///
/// A boundary is only a candidate when it separates the instances of at least
/// one partition.
pub fn scan_summed(attribute: usize, partitions: &[&Partition<'_, '_>], best: &mut BestSplits) {
    let totals: Vec<(f64, f64)> = partitions
        .iter()
        .map(|p| (p.total_weight(), p.weighted_sum()))
        .collect();
    let per_partition: Vec<Vec<(usize, Bucket)>> = partitions
        .iter()
        .enumerate()
        .map(|(p, partition)| {
            attribute_buckets(partition, attribute)
                .into_iter()
                .map(|b| (p, b))
                .collect()
        })
        .collect();
    let n_buckets: Vec<usize> = per_partition.iter().map(Vec::len).collect();
    let merged: Vec<(usize, Bucket)> = per_partition
        .into_iter()
        .kmerge_by(|a, b| a.1.value < b.1.value)
        .collect();

    let mut left = vec![(0.0, 0.0); partitions.len()];
    let mut gains: Vec<f64> = totals.iter().map(|&(w, s)| side_gain(s, w)).collect();
    let mut seen = vec![0usize; partitions.len()];
    // partitions with buckets on both sides of the current boundary
    let mut straddled = 0usize;

    let mut i = 0;
    while i < merged.len() {
        let value = merged[i].1.value;
        while i < merged.len() && merged[i].1.value == value {
            let (p, bucket) = merged[i];
            seen[p] += 1;
            if n_buckets[p] > 1 && seen[p] == 1 {
                straddled += 1;
            }
            if n_buckets[p] > 1 && seen[p] == n_buckets[p] {
                straddled -= 1;
            }
            left[p].0 += bucket.weight;
            left[p].1 += bucket.sum;
            let (total_weight, total_sum) = totals[p];
            let gain = side_gain(left[p].1, left[p].0)
                + side_gain(total_sum - left[p].1, total_weight - left[p].0);
            gains[p] = gain;
            i += 1;
        }
        if straddled == 0 {
            continue;
        }
        if let Some(&(_, next)) = merged.get(i) {
            // summed afresh so equal gain vectors give bit-equal totals
            best.offer(SplitCandidate {
                attribute,
                threshold: midpoint(value, next.value),
                gain: gains.iter().sum(),
            });
        }
    }
}
