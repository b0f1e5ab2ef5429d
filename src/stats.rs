//! Small numeric helpers shared by the tree policy, the rollout and the retention criteria.

use rand::seq::SliceRandom;
use rand::Rng;

/// Returns true if `a` and `b` differ by less than `tolerance`.
#[inline]
pub fn is_equal_to(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() < tolerance
}

/// Returns true if `a` is smaller than `b` by more than `tolerance`.
#[inline]
pub fn is_less_than(a: f64, b: f64, tolerance: f64) -> bool {
    a < b - tolerance
}

/// Index of the largest score; ties are broken uniformly at random.
///
/// Two scores tie when they are equal up to machine precision relative to the maximum.  Returns
/// `None` for an empty slice.
pub fn argmax_random<R>(scores: &[f64], rng: &mut R) -> Option<usize>
where
    R: ?Sized + Rng,
{
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let tolerance = f64::EPSILON * max.abs().max(1.0);
    let maximizers = scores
        .iter()
        .enumerate()
        .filter(|(_, s)| max - **s <= tolerance)
        .map(|(i, _)| i)
        .collect::<Vec<_>>();
    maximizers.choose(rng).copied()
}

/// Arithmetic mean, `None` when `data` is empty.
pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        None
    } else {
        Some(data.iter().sum::<f64>() / data.len() as f64)
    }
}

/// Population variance, `None` when `data` is empty.
pub fn variance(data: &[f64]) -> Option<f64> {
    let m = mean(data)?;
    Some(data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / data.len() as f64)
}

/// Distance of `v` to a scalar distribution in units of its standard deviation.
///
/// A value equal to the mean is at distance `0`; otherwise a distribution with zero variance is
/// infinitely far away.
pub fn mahalanobis_distance_1d(v: f64, mean: f64, variance: f64) -> f64 {
    if v == mean {
        0.0
    } else if variance <= 0.0 {
        f64::INFINITY
    } else {
        ((v - mean).powi(2) / variance).sqrt()
    }
}

/// A cluster of samples that are equal within a tolerance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mode {
    /// The first sample that opened the cluster.
    pub value: f64,
    /// Number of samples in the cluster.
    pub count: usize,
}

/// Groups `samples` into modes of equal value.
///
/// Each sample joins the first mode whose value lies within `tolerance`; modes are returned in
/// order of first appearance.
pub fn modes(samples: &[f64], tolerance: f64) -> Vec<Mode> {
    let mut modes: Vec<Mode> = Vec::new();
    for &s in samples {
        match modes
            .iter_mut()
            .find(|m| is_equal_to(m.value, s, tolerance))
        {
            Some(m) => m.count += 1,
            None => modes.push(Mode { value: s, count: 1 }),
        }
    }
    modes
}
