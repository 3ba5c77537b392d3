use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::analysis::assignment::min_cost_assignment;
use crate::core::domain::TypeLabels;
use crate::core::error::DiversityError;
use crate::engine::fingerprint::Fingerprints;

/// Distance between two structures' per-atom fingerprints.
///
/// Must be symmetric, non-negative and zero for identical inputs.
pub trait FingerprintMetric: Send + Sync {
    fn distance(
        &self,
        a: &Fingerprints,
        b: &Fingerprints,
        labels: &TypeLabels,
    ) -> Result<f64, DiversityError>;
}

/// Species-aware optimal-assignment distance.
///
/// Within each species group the atoms of one structure are matched to the
/// atoms of the other by minimum total cost, with the per-pair cost being the
/// RMS fingerprint difference. The matched costs are averaged over all atoms.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssignmentMetric;

impl FingerprintMetric for AssignmentMetric {
    fn distance(
        &self,
        a: &Fingerprints,
        b: &Fingerprints,
        labels: &TypeLabels,
    ) -> Result<f64, DiversityError> {
        let nat = a.n_atoms();
        if b.n_atoms() != nat {
            return Err(DiversityError::FingerprintDimensionMismatch {
                expected: nat,
                found: b.n_atoms(),
            });
        }
        if a.dim() != b.dim() {
            return Err(DiversityError::FingerprintDimensionMismatch {
                expected: a.dim(),
                found: b.dim(),
            });
        }
        if nat == 0 {
            return Ok(0.0);
        }
        let dim = a.dim().max(1) as f64;
        let (ma, mb) = (a.matrix(), b.matrix());

        let mut total = 0.0;
        for g in 0..labels.n_groups() {
            let members = labels.members(g);
            let k = members.len();
            if k == 0 {
                continue;
            }
            let cost = DMatrix::from_fn(k, k, |r, c| {
                let (ia, ib) = (members[r], members[c]);
                let sq = (ma.row(ia) - mb.row(ib)).norm_squared();
                (sq / dim).sqrt()
            });
            if cost.iter().any(|x| !x.is_finite()) {
                return Err(DiversityError::InvalidFingerprint { index: 0 });
            }
            total += min_cost_assignment(&cost).0;
        }
        Ok(total / nat as f64)
    }
}

/// Symmetric pairwise fingerprint-distance matrix with zero diagonal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceMatrix {
    values: DMatrix<f64>,
}

impl DistanceMatrix {
    /// Wraps a precomputed matrix after checking it is a valid distance matrix.
    pub fn from_matrix(values: DMatrix<f64>) -> Result<Self, DiversityError> {
        let n = values.nrows();
        if values.ncols() != n {
            return Err(DiversityError::InvalidDistanceMatrix(format!(
                "not square: {}x{}",
                n,
                values.ncols()
            )));
        }
        for i in 0..n {
            if values[(i, i)] != 0.0 {
                return Err(DiversityError::InvalidDistanceMatrix(format!(
                    "non-zero diagonal at {}",
                    i
                )));
            }
            for j in 0..i {
                let (x, y) = (values[(i, j)], values[(j, i)]);
                for (v, r, c) in [(x, i, j), (y, j, i)] {
                    if !v.is_finite() || v < 0.0 {
                        return Err(DiversityError::InvalidDistanceMatrix(format!(
                            "bad entry {} at ({}, {})",
                            v, r, c
                        )));
                    }
                }
                if (x - y).abs() > 1e-9 * x.abs().max(1.0) {
                    return Err(DiversityError::InvalidDistanceMatrix(format!(
                        "asymmetric at ({}, {})",
                        i, j
                    )));
                }
            }
        }
        Ok(Self { values })
    }

    /// Re-checks a matrix that came from disk.
    pub fn validated(self) -> Result<Self, DiversityError> {
        Self::from_matrix(self.values)
    }

    pub fn len(&self) -> usize {
        self.values.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.values.nrows() == 0
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[(i, j)]
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.values
    }
}

/// Builds distance matrices for a batch of structures sharing one species labeling.
pub struct DistanceMatrixBuilder<M: FingerprintMetric = AssignmentMetric> {
    metric: M,
}

impl Default for DistanceMatrixBuilder<AssignmentMetric> {
    fn default() -> Self {
        Self {
            metric: AssignmentMetric,
        }
    }
}

impl<M: FingerprintMetric> DistanceMatrixBuilder<M> {
    pub fn new(metric: M) -> Self {
        Self { metric }
    }

    /// `D[i][j] = metric(fp_i, fp_j) * sqrt(fingerprint dimension)`, mirrored.
    pub fn build(
        &self,
        batch: &[Fingerprints],
        labels: &TypeLabels,
    ) -> Result<DistanceMatrix, DiversityError> {
        let m = batch.len();
        let dim = batch.first().map_or(0, |f| f.dim());

        for (index, fp) in batch.iter().enumerate() {
            if fp.n_atoms() != labels.len() {
                return Err(DiversityError::InconsistentSpecies {
                    index,
                    labels: labels.len(),
                    atoms: fp.n_atoms(),
                });
            }
            if fp.dim() != dim {
                return Err(DiversityError::FingerprintDimensionMismatch {
                    expected: dim,
                    found: fp.dim(),
                });
            }
            if !fp.is_finite() {
                return Err(DiversityError::InvalidFingerprint { index });
            }
        }

        let shift = (dim as f64).sqrt();

        // Lower triangle, one row per task.
        let rows: Vec<Vec<f64>> = (0..m)
            .into_par_iter()
            .map(|i| {
                (0..i)
                    .map(|j| {
                        self.metric
                            .distance(&batch[i], &batch[j], labels)
                            .map(|d| d * shift)
                    })
                    .collect::<Result<Vec<f64>, DiversityError>>()
            })
            .collect::<Result<Vec<_>, DiversityError>>()?;

        let mut values = DMatrix::zeros(m, m);
        for (i, row) in rows.iter().enumerate() {
            for (j, &d) in row.iter().enumerate() {
                values[(i, j)] = d;
                values[(j, i)] = d;
            }
        }
        Ok(DistanceMatrix { values })
    }
}
