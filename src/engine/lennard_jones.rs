use anyhow::{bail, Result};
use nalgebra::{Matrix3, Vector3};

use crate::core::domain::Structure;
use crate::core::spatial;
use crate::engine::potential::{Potential, Property, PropertyResults};

/// Shifted Lennard-Jones pair potential with a single parameter set for all
/// species. Periodic images within the cutoff are included.
#[derive(Debug, Clone, PartialEq)]
pub struct LennardJones {
    pub epsilon: f64,
    pub sigma: f64,
    pub cutoff: f64,
}

struct Evaluation {
    energy: f64,
    forces: Vec<Vector3<f64>>,
    stress: Matrix3<f64>,
}

impl LennardJones {
    pub fn new(epsilon: f64, sigma: f64, cutoff: f64) -> Self {
        Self { epsilon, sigma, cutoff }
    }

    /// Pair energy and its radial derivative, unshifted.
    #[inline]
    fn pair(&self, r: f64) -> (f64, f64) {
        let sr6 = (self.sigma / r).powi(6);
        let sr12 = sr6 * sr6;
        let e = 4.0 * self.epsilon * (sr12 - sr6);
        let de = 4.0 * self.epsilon * (-12.0 * sr12 + 6.0 * sr6) / r;
        (e, de)
    }

    fn evaluate(&self, structure: &Structure) -> Result<Evaluation> {
        let n = structure.len();
        let lattice = structure.lattice.as_ref();
        let shift = self.pair(self.cutoff).0;
        let images = spatial::image_translations(lattice, self.cutoff);

        let mut energy = 0.0;
        let mut forces = vec![Vector3::zeros(); n];
        let mut virial = Matrix3::zeros();

        // Ordered pairs (i, j, image): every unordered pair is visited twice,
        // so energy and virial carry a factor of one half.
        for i in 0..n {
            for j in 0..n {
                let base = spatial::displacement(
                    &structure.atoms[i].position,
                    &structure.atoms[j].position,
                    lattice,
                );
                for t in &images {
                    let r_vec = base + t;
                    let r = r_vec.norm();
                    if r >= self.cutoff {
                        continue;
                    }
                    if r < 1e-10 {
                        if i == j {
                            continue;
                        }
                        bail!("atoms {} and {} overlap", i, j);
                    }
                    let (e, de) = self.pair(r);
                    energy += 0.5 * (e - shift);
                    forces[i] += r_vec * (de / r);
                    virial += (r_vec * r_vec.transpose()) * (0.5 * de / r);
                }
            }
        }

        let stress = match lattice {
            Some(lat) => virial / lat.volume(),
            None => Matrix3::zeros(),
        };

        Ok(Evaluation {
            energy,
            forces,
            stress,
        })
    }
}

impl Potential for LennardJones {
    fn energy(&self, structure: &Structure) -> Result<f64> {
        Ok(self.evaluate(structure)?.energy)
    }

    fn forces(&self, structure: &Structure) -> Result<Vec<Vector3<f64>>> {
        Ok(self.evaluate(structure)?.forces)
    }

    fn stress(&self, structure: &Structure) -> Result<Matrix3<f64>> {
        Ok(self.evaluate(structure)?.stress)
    }

    fn calculate(&self, structure: &Structure, properties: &[Property]) -> Result<PropertyResults> {
        let eval = self.evaluate(structure)?;
        let mut out = PropertyResults::default();
        for p in properties {
            match p {
                Property::Energy => out.energy = Some(eval.energy),
                Property::Forces => out.forces = Some(eval.forces.clone()),
                Property::Stress => out.stress = Some(eval.stress),
            }
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        "Lennard-Jones"
    }
}
