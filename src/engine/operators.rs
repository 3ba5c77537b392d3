use nalgebra::Vector3;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::core::domain::{Lattice, Structure};

/// A composable perturbation builder applied to seed structures before
/// relaxation.
#[derive(Clone, Debug, Default)]
pub struct Mutator {
    rattle_stdev: Option<f64>, // Gaussian displacement per coordinate (Å)
    strain_intensity: Option<f64>, // Isotropic scaling range
}

impl Mutator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Displaces every coordinate by a normal deviate with standard deviation `stdev`.
    pub fn rattle(mut self, stdev: f64) -> Self {
        self.rattle_stdev = Some(stdev);
        self
    }

    /// Scales cell and positions by a uniform factor in `1 ± intensity`.
    pub fn strain(mut self, intensity: f64) -> Self {
        self.strain_intensity = Some(intensity);
        self
    }

    pub fn apply(&self, structure: &Structure, rng: &mut impl Rng) -> Structure {
        let mut s = structure.clone();
        s.energy = None;

        // 1. Strain (Global Scaling)
        if let Some(mag) = self.strain_intensity.filter(|m| *m > 0.0) {
            let scale = 1.0 + rng.gen_range(-mag..mag);
            for atom in &mut s.atoms {
                atom.position.coords *= scale;
            }
            if let Some(lat) = &s.lattice {
                if let Some(scaled) = Lattice::from_matrix(lat.vectors * scale) {
                    s.lattice = Some(scaled);
                }
            }
        }

        // 2. Rattle
        if let Some(stdev) = self.rattle_stdev {
            if let Ok(normal) = Normal::new(0.0, stdev) {
                for atom in &mut s.atoms {
                    atom.position += Vector3::new(
                        normal.sample(rng),
                        normal.sample(rng),
                        normal.sample(rng),
                    );
                }
            }
        }

        s
    }
}
