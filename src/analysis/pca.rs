use nalgebra::{DMatrix, SymmetricEigen};
use serde::{Deserialize, Serialize};

use crate::engine::fingerprint::Fingerprints;

/// Low-dimensional projection of a batch, kept for inspection only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    /// M x c principal-component scores.
    pub coords: DMatrix<f64>,
    pub explained_variance_ratio: Vec<f64>,
}

/// Projects the flattened, centred fingerprints of a batch onto its leading
/// `min(3, M, F)` principal components.
///
/// Returns `None` for an empty batch or when the flattened lengths differ.
pub fn embed(batch: &[Fingerprints]) -> Option<Embedding> {
    let m = batch.len();
    let f = batch.first()?.flatten().len();
    if f == 0 {
        return None;
    }

    let mut x: DMatrix<f64> = DMatrix::zeros(m, f);
    for (i, fp) in batch.iter().enumerate() {
        let row = fp.flatten();
        if row.len() != f {
            return None;
        }
        for (c, v) in row.into_iter().enumerate() {
            x[(i, c)] = v;
        }
    }
    for c in 0..f {
        let mean = x.column(c).mean();
        x.column_mut(c).add_scalar_mut(-mean);
    }

    let n_comp = 3.min(m).min(f);

    // Eigen-decompose whichever of X Xᵀ / Xᵀ X is smaller.
    let (values, coords) = if m <= f {
        let eigen = SymmetricEigen::new(&x * x.transpose());
        let order = descending(eigen.eigenvalues.as_slice());
        let mut coords: DMatrix<f64> = DMatrix::zeros(m, n_comp);
        for (c, &e) in order.iter().take(n_comp).enumerate() {
            let scale = eigen.eigenvalues[e].max(0.0).sqrt();
            coords.set_column(c, &(eigen.eigenvectors.column(e) * scale));
        }
        (order.iter().map(|&e| eigen.eigenvalues[e]).collect::<Vec<_>>(), coords)
    } else {
        let eigen = SymmetricEigen::new(x.transpose() * &x);
        let order = descending(eigen.eigenvalues.as_slice());
        let mut coords: DMatrix<f64> = DMatrix::zeros(m, n_comp);
        for (c, &e) in order.iter().take(n_comp).enumerate() {
            coords.set_column(c, &(&x * eigen.eigenvectors.column(e)));
        }
        (order.iter().map(|&e| eigen.eigenvalues[e]).collect::<Vec<_>>(), coords)
    };

    let total: f64 = values.iter().map(|v| v.max(0.0)).sum();
    let explained_variance_ratio = values
        .iter()
        .take(n_comp)
        .map(|v| if total > 0.0 { v.max(0.0) / total } else { 0.0 })
        .collect();

    Some(Embedding {
        coords,
        explained_variance_ratio,
    })
}

fn descending(values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));
    order
}
