use std::f64::consts::PI;

use anyhow::Result;
use nalgebra::{DMatrix, Vector3};
use serde::{Deserialize, Serialize};

use crate::core::domain::Structure;
use crate::core::error::{DiversityError, FingerprintError};
use crate::core::spatial;

/// Per-atom fingerprint vectors of one structure, stored as an N x D matrix
/// (one row per atom).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprints {
    matrix: DMatrix<f64>,
}

impl Fingerprints {
    pub fn from_matrix(matrix: DMatrix<f64>) -> Self {
        Self { matrix }
    }

    /// Builds fingerprints from per-atom rows; every row must have the same length.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, DiversityError> {
        let dim = rows.first().map_or(0, |r| r.len());
        let mut flat = Vec::with_capacity(rows.len() * dim);
        for r in rows {
            if r.len() != dim {
                return Err(DiversityError::FingerprintDimensionMismatch {
                    expected: dim,
                    found: r.len(),
                });
            }
            flat.extend_from_slice(r);
        }
        Ok(Self {
            matrix: DMatrix::from_row_slice(rows.len(), dim, &flat),
        })
    }

    pub fn n_atoms(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn dim(&self) -> usize {
        self.matrix.ncols()
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Euclidean distance between the fingerprints of atoms `i` and `j`.
    #[inline]
    pub fn pair_distance(&self, i: usize, j: usize) -> f64 {
        let mut acc = 0.0;
        for d in 0..self.dim() {
            let x = self.matrix[(i, d)] - self.matrix[(j, d)];
            acc += x * x;
        }
        acc.sqrt()
    }

    /// All entries, atom-major.
    pub fn flatten(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.n_atoms() * self.dim());
        for i in 0..self.n_atoms() {
            out.extend(self.matrix.row(i).iter());
        }
        out
    }

    pub fn is_finite(&self) -> bool {
        self.matrix.iter().all(|x| x.is_finite())
    }

    /// The same fingerprints with atoms reordered: row `k` of the result is
    /// row `order[k]` of `self`.
    pub fn permuted(&self, order: &[usize]) -> Self {
        let dim = self.dim();
        Self {
            matrix: DMatrix::from_fn(order.len(), dim, |r, c| self.matrix[(order[r], c)]),
        }
    }
}

/// Rank-3 tensor of fingerprint derivatives, `d fp[j] / d r[i][k]`, each entry a
/// D-vector.
#[derive(Debug, Clone, PartialEq)]
pub struct FingerprintGradient {
    n_atoms: usize,
    dim: usize,
    data: Vec<f64>,
}

impl FingerprintGradient {
    pub fn zeros(n_atoms: usize, dim: usize) -> Self {
        Self {
            n_atoms,
            dim,
            data: vec![0.0; n_atoms * n_atoms * 3 * dim],
        }
    }

    pub fn n_atoms(&self) -> usize {
        self.n_atoms
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    fn offset(&self, j: usize, i: usize, k: usize) -> usize {
        ((j * self.n_atoms + i) * 3 + k) * self.dim
    }

    /// Derivative of atom `j`'s fingerprint with respect to coordinate `k` of atom `i`.
    #[inline]
    pub fn component(&self, j: usize, i: usize, k: usize) -> &[f64] {
        let o = self.offset(j, i, k);
        &self.data[o..o + self.dim]
    }

    #[inline]
    pub fn component_mut(&mut self, j: usize, i: usize, k: usize) -> &mut [f64] {
        let o = self.offset(j, i, k);
        &mut self.data[o..o + self.dim]
    }
}

/// Output of a fingerprint evaluation.
#[derive(Debug, Clone)]
pub struct FingerprintSet {
    pub fingerprints: Fingerprints,
    pub gradient: Option<FingerprintGradient>,
}

/// Deterministic per-atom structural descriptor.
///
/// Implementations must return the same result for identical structures and
/// parameters, and must set `gradient` whenever `with_gradient` is requested.
pub trait FingerprintProvider: Send + Sync {
    fn fingerprint(
        &self,
        structure: &Structure,
        cutoff: f64,
        max_neighbors: usize,
        with_gradient: bool,
    ) -> Result<FingerprintSet>;

    fn name(&self) -> &str;
}

/// Species-resolved radial fingerprint: for each atom, a set of Gaussians
/// on the neighbour distances per neighbour species, damped by a cosine
/// cutoff. Dimension is `n_species * n_basis`.
#[derive(Debug, Clone, PartialEq)]
pub struct RadialFingerprint {
    pub n_basis: usize,
    pub width: f64,
}

impl Default for RadialFingerprint {
    fn default() -> Self {
        Self {
            n_basis: 12,
            width: 0.4,
        }
    }
}

impl RadialFingerprint {
    pub fn new(n_basis: usize, width: f64) -> Self {
        Self {
            n_basis: n_basis.max(2),
            width,
        }
    }

    fn centers(&self, cutoff: f64) -> Vec<f64> {
        let step = cutoff / (self.n_basis - 1) as f64;
        (0..self.n_basis).map(|m| m as f64 * step).collect()
    }

    /// Basis value and its radial derivative at distance `r`.
    #[inline]
    fn basis(&self, r: f64, mu: f64, cutoff: f64) -> (f64, f64) {
        let s2 = self.width * self.width;
        let g = (-(r - mu) * (r - mu) / (2.0 * s2)).exp();
        let dg = -g * (r - mu) / s2;
        let (sin, cos) = (PI * r / cutoff).sin_cos();
        let fc = 0.5 * (cos + 1.0);
        let dfc = -0.5 * PI / cutoff * sin;
        (g * fc, dg * fc + g * dfc)
    }
}

impl FingerprintProvider for RadialFingerprint {
    fn fingerprint(
        &self,
        structure: &Structure,
        cutoff: f64,
        max_neighbors: usize,
        with_gradient: bool,
    ) -> Result<FingerprintSet> {
        let n = structure.len();
        if n == 0 {
            return Err(FingerprintError::EmptyStructure.into());
        }
        let n_species = structure.species.len().max(1);
        let dim = n_species * self.n_basis;
        let lattice = structure.lattice.as_ref();
        let images = spatial::image_translations(lattice, cutoff);
        let centers = self.centers(cutoff);

        let mut fp = DMatrix::<f64>::zeros(n, dim);
        let mut dfp = with_gradient.then(|| FingerprintGradient::zeros(n, dim));

        for j in 0..n {
            let mut neighbors = 0;
            for m in 0..n {
                let base = spatial::displacement(
                    &structure.atoms[j].position,
                    &structure.atoms[m].position,
                    lattice,
                );
                let channel = structure.atoms[m].element_id * self.n_basis;

                for t in &images {
                    let r_vec = base + t;
                    let r = r_vec.norm();
                    if r >= cutoff {
                        continue;
                    }
                    if r < 1e-8 {
                        if m == j {
                            continue;
                        }
                        return Err(FingerprintError::OverlappingAtoms { first: j, second: m }.into());
                    }

                    neighbors += 1;
                    if neighbors > max_neighbors {
                        let found = count_neighbors(structure, j, cutoff, &images);
                        return Err(FingerprintError::TooManyNeighbors {
                            atom: j,
                            found,
                            limit: max_neighbors,
                        }
                        .into());
                    }

                    let unit = r_vec / r;
                    for (b, &mu) in centers.iter().enumerate() {
                        let (val, dval) = self.basis(r, mu, cutoff);
                        fp[(j, channel + b)] += val;

                        // Self-images move rigidly with atom j: no derivative.
                        if m == j {
                            continue;
                        }
                        if let Some(dfp) = dfp.as_mut() {
                            for k in 0..3 {
                                let g = dval * unit[k];
                                dfp.component_mut(j, m, k)[channel + b] += g;
                                dfp.component_mut(j, j, k)[channel + b] -= g;
                            }
                        }
                    }
                }
            }
        }

        Ok(FingerprintSet {
            fingerprints: Fingerprints::from_matrix(fp),
            gradient: dfp,
        })
    }

    fn name(&self) -> &str {
        "radial"
    }
}

fn count_neighbors(
    structure: &Structure,
    j: usize,
    cutoff: f64,
    images: &[Vector3<f64>],
) -> usize {
    let lattice = structure.lattice.as_ref();
    let mut count = 0;
    for (m, atom) in structure.atoms.iter().enumerate() {
        let base = spatial::displacement(&structure.atoms[j].position, &atom.position, lattice);
        for t in images {
            let r = (base + t).norm();
            if r < cutoff && !(m == j && r < 1e-8) {
                count += 1;
            }
        }
    }
    count
}
