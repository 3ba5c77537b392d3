//! Fingerprint-space novelty ("entropy") of a structure and its analytic
//! position derivative.
//!
//! The score is the mean over atoms of `ln(N * d_i)`, where `d_i` is the
//! distance from atom i's fingerprint to its nearest other fingerprint. It
//! grows when every local environment differs from every other one.

use nalgebra::Vector3;

use crate::core::error::DiversityError;
use crate::engine::fingerprint::{FingerprintGradient, Fingerprints};

/// Floor applied to nearest-neighbour fingerprint distances in the score.
pub const MIN_FP_DISTANCE: f64 = 1e-8;

/// Squared distances below this are rescaled in the gradient denominator.
pub const GRADIENT_CLAMP: f64 = 1e-6;

/// Nearest other atom in fingerprint space, by exhaustive search.
/// Ties keep the first index found.
fn nearest(fps: &Fingerprints, i: usize) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for j in 0..fps.n_atoms() {
        if j == i {
            continue;
        }
        let d = fps.pair_distance(i, j);
        if d < best.1 {
            best = (j, d);
        }
    }
    best
}

/// Index of each atom's nearest fingerprint neighbour, without any floor.
pub fn nearest_neighbors(fps: &Fingerprints) -> Result<Vec<usize>, DiversityError> {
    let n = fps.n_atoms();
    if n < 2 {
        return Err(DiversityError::InsufficientAtoms { found: n });
    }
    Ok((0..n).map(|i| nearest(fps, i).0).collect())
}

/// Scalar novelty score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoveltyScorer {
    strict: bool,
}

impl NoveltyScorer {
    pub fn new() -> Self {
        Self { strict: false }
    }

    /// A scorer that refuses degenerate fingerprints instead of flooring them.
    pub fn strict() -> Self {
        Self { strict: true }
    }

    pub fn score(&self, fps: &Fingerprints) -> Result<f64, DiversityError> {
        let n = fps.n_atoms();
        if n < 2 {
            return Err(DiversityError::InsufficientAtoms { found: n });
        }

        let mut total = 0.0;
        for i in 0..n {
            let (neighbor, mut d) = nearest(fps, i);
            if d < MIN_FP_DISTANCE {
                if self.strict {
                    return Err(DiversityError::DegenerateFingerprint { atom: i, neighbor });
                }
                d = MIN_FP_DISTANCE;
            }
            total += (n as f64 * d).ln();
        }
        Ok(total / n as f64)
    }
}

/// Force-like derivative of the novelty score, `-d score / d r`, outside the
/// clamp region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoveltyGradient;

impl NoveltyGradient {
    pub fn gradient(
        &self,
        fps: &Fingerprints,
        dfp: &FingerprintGradient,
    ) -> Result<Vec<Vector3<f64>>, DiversityError> {
        let n = fps.n_atoms();
        if dfp.n_atoms() != n {
            return Err(DiversityError::FingerprintDimensionMismatch {
                expected: n,
                found: dfp.n_atoms(),
            });
        }
        if dfp.dim() != fps.dim() {
            return Err(DiversityError::FingerprintDimensionMismatch {
                expected: fps.dim(),
                found: dfp.dim(),
            });
        }
        let lvals = nearest_neighbors(fps)?;
        let inv_n = 1.0 / n as f64;

        // Per-atom fingerprint difference to its nearest neighbour, shared by every i.
        let diffs: Vec<(Vec<f64>, f64)> = (0..n)
            .map(|j| {
                let l = lvals[j];
                let diff: Vec<f64> = (0..fps.dim())
                    .map(|d| fps.matrix()[(j, d)] - fps.matrix()[(l, d)])
                    .collect();
                let sq: f64 = diff.iter().map(|x| x * x).sum();
                (diff, sq)
            })
            .collect();

        let mut grad = vec![Vector3::zeros(); n];
        for (i, g) in grad.iter_mut().enumerate() {
            for j in 0..n {
                let (fpdiff, deltaq_sq) = &diffs[j];
                if *deltaq_sq == 0.0 {
                    continue;
                }
                let denominator = stabilized(*deltaq_sq);
                let l = lvals[j];
                for k in 0..3 {
                    let dj = dfp.component(j, i, k);
                    let dl = dfp.component(l, i, k);
                    let dot: f64 = dj
                        .iter()
                        .zip(dl)
                        .zip(fpdiff)
                        .map(|((a, b), f)| (a - b) * f)
                        .sum();
                    g[k] += -inv_n * dot / denominator;
                }
            }
        }
        Ok(grad)
    }
}

/// Raises a near-singular denominator by a power of ten so that it lands at
/// or above the clamp threshold. This bounds the gradient magnitude for
/// near-degenerate pairs at the cost of a jump at the threshold.
#[inline]
fn stabilized(deltaq_sq: f64) -> f64 {
    if deltaq_sq < GRADIENT_CLAMP {
        let shift = -6 - deltaq_sq.log10().floor() as i32;
        deltaq_sq * 10f64.powi(shift)
    } else {
        deltaq_sq
    }
}
