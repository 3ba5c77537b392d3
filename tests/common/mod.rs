#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use nalgebra::{Matrix3, Point3, Vector3};

use entmax_forge::core::domain::{Lattice, Structure};
use entmax_forge::engine::fingerprint::{FingerprintProvider, FingerprintSet, RadialFingerprint};
use entmax_forge::engine::lennard_jones::LennardJones;
use entmax_forge::engine::potential::{Potential, Property, PropertyResults};

/// Five atoms of two species at irregular, well-separated positions, so no
/// two local environments look alike.
pub fn irregular_cluster() -> Structure {
    let positions = [
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.9, 0.2, -0.1),
        Point3::new(0.4, 1.7, 0.3),
        Point3::new(-0.3, 0.5, 2.0),
        Point3::new(1.4, 1.3, 1.6),
    ];
    Structure::from_symbols("irregular", &["A", "B", "A", "A", "B"], &positions, None)
}

/// Three atoms in a 6 Å cubic cell.
pub fn periodic_triplet() -> Structure {
    let positions = [
        Point3::new(0.5, 0.4, 0.3),
        Point3::new(2.6, 0.9, 0.5),
        Point3::new(1.2, 2.8, 3.1),
    ];
    Structure::from_symbols("periodic", &["A", "A", "B"], &positions, Lattice::cubic(6.0))
}

pub fn soft_lj() -> LennardJones {
    LennardJones::new(0.1, 1.5, 5.0)
}

/// Copy of `s` with coordinate `k` of atom `i` moved by `h`.
pub fn nudged(s: &Structure, i: usize, k: usize, h: f64) -> Structure {
    let mut out = s.clone();
    let mut delta = vec![Vector3::zeros(); s.len()];
    delta[i][k] = h;
    out.displace(&delta);
    out
}

/// Central-difference derivative of `f` with respect to every coordinate.
pub fn numerical_gradient<F>(s: &Structure, h: f64, f: F) -> Vec<Vector3<f64>>
where
    F: Fn(&Structure) -> f64,
{
    (0..s.len())
        .map(|i| {
            let mut g = Vector3::zeros();
            for k in 0..3 {
                g[k] = (f(&nudged(s, i, k, h)) - f(&nudged(s, i, k, -h))) / (2.0 * h);
            }
            g
        })
        .collect()
}

pub fn assert_vectors_close(a: &[Vector3<f64>], b: &[Vector3<f64>], rel: f64) {
    assert_eq!(a.len(), b.len());
    for (i, (x, y)) in a.iter().zip(b).enumerate() {
        for k in 0..3 {
            let scale = x[k].abs().max(y[k].abs()).max(1.0);
            assert!(
                (x[k] - y[k]).abs() < rel * scale,
                "atom {} axis {}: {} vs {}",
                i,
                k,
                x[k],
                y[k]
            );
        }
    }
}

/// Lennard-Jones that counts how often it is asked for anything.
pub struct CountingPotential {
    pub inner: LennardJones,
    pub calls: AtomicUsize,
}

impl CountingPotential {
    pub fn new(inner: LennardJones) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Potential for CountingPotential {
    fn energy(&self, structure: &Structure) -> Result<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.energy(structure)
    }

    fn forces(&self, structure: &Structure) -> Result<Vec<Vector3<f64>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.forces(structure)
    }

    fn stress(&self, structure: &Structure) -> Result<Matrix3<f64>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.stress(structure)
    }

    fn calculate(&self, structure: &Structure, properties: &[Property]) -> Result<PropertyResults> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.calculate(structure, properties)
    }

    fn name(&self) -> &str {
        "Counting LJ"
    }
}

/// Radial fingerprints with a call counter.
pub struct CountingProvider {
    pub inner: RadialFingerprint,
    pub calls: AtomicUsize,
}

impl CountingProvider {
    pub fn new() -> Self {
        Self {
            inner: RadialFingerprint::default(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FingerprintProvider for CountingProvider {
    fn fingerprint(
        &self,
        structure: &Structure,
        cutoff: f64,
        max_neighbors: usize,
        with_gradient: bool,
    ) -> Result<FingerprintSet> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner
            .fingerprint(structure, cutoff, max_neighbors, with_gradient)
    }

    fn name(&self) -> &str {
        "Counting radial"
    }
}
